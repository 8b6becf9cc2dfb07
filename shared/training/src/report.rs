//! Plain-text progress report of a monitored session.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};

use crate::monitor::MonitorSnapshot;
use crate::session::TrainingSession;

const NO_VALIDATION: &str = "no validation";

/// Renders a session's progress, losses and metrics.
pub struct SessionReport<'a>(pub &'a TrainingSession);

impl Display for SessionReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(f, "Session {} [{}]", s.session_id, s.status_type)?;
        match (s.current_epoch, s.total_epochs) {
            (Some(current), Some(total)) => write!(f, " epoch {current}/{total}")?,
            (Some(current), None) => write!(f, " epoch {current}")?,
            _ => {}
        }
        writeln!(f)?;

        if let Some(message) = s.message.as_deref().filter(|m| !m.is_empty()) {
            writeln!(f, "Message: {message}")?;
        }
        if let Some(dataset) = &s.dataset_artifact_id {
            writeln!(f, "Dataset: {dataset}")?;
        }
        if let Some(start) = &s.start_time {
            writeln!(f, "Started: {}", format_start_time(start))?;
        }
        if let Some(elapsed) = s.elapsed_seconds {
            writeln!(f, "Elapsed: {}", format_elapsed(elapsed))?;
        }
        if let (Some(batch), Some(total)) = (s.current_batch, s.total_batches) {
            writeln!(f, "Batch: {batch}/{total}")?;
        }
        match (s.n_train, s.n_test) {
            (Some(train), Some(test)) => writeln!(f, "Samples: {train} train, {test} test")?,
            (Some(train), None) => writeln!(f, "Samples: {train} train")?,
            _ => {}
        }

        let epochs = s.train_losses.len().max(s.test_losses.len());
        if epochs > 0 {
            writeln!(f, "{:>5}  {:>10}  {:>13}", "Epoch", "Train loss", "Test loss")?;
            for epoch in 1..=epochs {
                let train = s
                    .train_losses
                    .get(epoch - 1)
                    .map(|l| format!("{l:.4}"))
                    .unwrap_or_else(|| "-".to_string());
                let test = match s.test_loss_at(epoch) {
                    Some(Some(loss)) => format!("{loss:.4}"),
                    Some(None) => NO_VALIDATION.to_string(),
                    None => "-".to_string(),
                };
                writeln!(f, "{epoch:>5}  {train:>10}  {test:>13}")?;
            }
        }

        if let Some((epoch, m)) = s.latest_test_metrics() {
            writeln!(
                f,
                "Test metrics (epoch {epoch}): pixel accuracy {:.3}, precision {:.3}, recall {:.3}, F1 {:.3}, IoU {:.3}",
                m.pixel_accuracy, m.precision, m.recall, m.f1, m.iou
            )?;
        }
        if let Some(ap) = &s.instance_metrics {
            write!(
                f,
                "Instance AP: @0.5 {:.3}, @0.75 {:.3}, @0.9 {:.3}",
                ap.ap_0_5, ap.ap_0_75, ap.ap_0_9
            )?;
            if let Some(n) = ap.n_images {
                write!(f, " over {n} images")?;
            }
            writeln!(f)?;
        }
        if let Some(artifact) = &s.exported_artifact_id {
            writeln!(f, "Exported as {artifact}")?;
        }
        Ok(())
    }
}

/// A [`SessionReport`] plus the monitor's own state.
pub struct SnapshotReport<'a>(pub &'a MonitorSnapshot);

impl Display for SnapshotReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        let Some(session) = &snapshot.session else {
            return writeln!(f, "No training session");
        };
        write!(f, "{}", SessionReport(session))?;
        writeln!(f, "Polling: {}", snapshot.poller)?;

        if snapshot.export_in_flight {
            writeln!(f, "Export in progress...")?;
        }
        if let Some(result) = &snapshot.export_result {
            if let Some(url) = &result.artifact_url {
                writeln!(f, "Artifact: {url}")?;
            }
            if let Some(url) = &result.download_url {
                writeln!(f, "Download: {url}")?;
            }
        }
        if let Some(error) = &snapshot.error {
            writeln!(f, "Error: {error}")?;
        }
        Ok(())
    }
}

/// Start times arrive either as unix seconds or as RFC 3339 text.
fn format_start_time(raw: &str) -> String {
    let parsed = match raw.parse::<f64>() {
        Ok(secs) => DateTime::<Utc>::from_timestamp(
            secs.trunc() as i64,
            (secs.fract() * 1e9) as u32,
        ),
        Err(_) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
    };
    match parsed {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => raw.to_string(),
    }
}

fn format_elapsed(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
