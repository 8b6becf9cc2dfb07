//! Folding partial status payloads into the locally cached session.
//!
//! Every field of [`StatusPayload`] is merged under one of three policies,
//! listed in [`FIELD_POLICIES`]. The merge is pure: it never touches the
//! network and never mutates its inputs.

use crate::protocol::StatusPayload;
use crate::session::{StatusType, TrainingSession};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Replace the local value when the payload carries one, keep it otherwise.
    OverwriteIfPresent,
    /// Take the first value seen; later values are ignored.
    FillOnce,
    /// Always reflect the most recent payload.
    AlwaysLatest,
}

pub const FIELD_POLICIES: &[(&str, FieldPolicy)] = &[
    ("status_type", FieldPolicy::AlwaysLatest),
    ("message", FieldPolicy::AlwaysLatest),
    ("train_losses", FieldPolicy::OverwriteIfPresent),
    ("test_losses", FieldPolicy::OverwriteIfPresent),
    ("current_epoch", FieldPolicy::OverwriteIfPresent),
    ("total_epochs", FieldPolicy::OverwriteIfPresent),
    ("elapsed_seconds", FieldPolicy::OverwriteIfPresent),
    ("n_train", FieldPolicy::OverwriteIfPresent),
    ("n_test", FieldPolicy::OverwriteIfPresent),
    ("current_batch", FieldPolicy::OverwriteIfPresent),
    ("total_batches", FieldPolicy::OverwriteIfPresent),
    ("start_time", FieldPolicy::OverwriteIfPresent),
    ("test_metrics", FieldPolicy::OverwriteIfPresent),
    ("instance_metrics", FieldPolicy::OverwriteIfPresent),
    ("exported_artifact_id", FieldPolicy::FillOnce),
    ("dataset_artifact_id", FieldPolicy::FillOnce),
];

pub fn policy_for(field: &str) -> Option<FieldPolicy> {
    FIELD_POLICIES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, policy)| *policy)
}

fn merge_value<T: Clone>(
    policy: FieldPolicy,
    current: &Option<T>,
    incoming: &Option<T>,
) -> Option<T> {
    match policy {
        FieldPolicy::AlwaysLatest => incoming.clone(),
        FieldPolicy::OverwriteIfPresent => incoming.clone().or_else(|| current.clone()),
        FieldPolicy::FillOnce => current.clone().or_else(|| incoming.clone()),
    }
}

/// Sequences are replaced wholesale; a payload without one leaves ours alone.
fn merge_sequence<T: Clone>(current: &[T], incoming: &Option<Vec<T>>) -> Vec<T> {
    match incoming {
        Some(fresh) => fresh.clone(),
        None => current.to_vec(),
    }
}

/// Status moves forward only: a stale lower-ranked status never replaces a
/// later one, and a missing status keeps the current one.
fn merge_status(current: StatusType, incoming: Option<StatusType>) -> StatusType {
    match incoming {
        Some(next) if !current.is_terminal() && next.rank() >= current.rank() => next,
        _ => current,
    }
}

pub fn merge(prev: &TrainingSession, payload: &StatusPayload) -> TrainingSession {
    let status_type = merge_status(prev.status_type, payload.status_type);
    // the message belongs to whichever status we ended up keeping
    let message = if payload.status_type == Some(status_type) {
        merge_value(FieldPolicy::AlwaysLatest, &prev.message, &payload.message)
    } else {
        prev.message.clone()
    };

    TrainingSession {
        session_id: prev.session_id.clone(),
        status_type,
        message,
        dataset_artifact_id: merge_value(
            FieldPolicy::FillOnce,
            &prev.dataset_artifact_id,
            &payload.dataset_artifact_id,
        ),
        train_losses: merge_sequence(&prev.train_losses, &payload.train_losses),
        test_losses: merge_sequence(&prev.test_losses, &payload.test_losses),
        current_epoch: merge_value(
            FieldPolicy::OverwriteIfPresent,
            &prev.current_epoch,
            &payload.current_epoch,
        ),
        total_epochs: merge_value(
            FieldPolicy::OverwriteIfPresent,
            &prev.total_epochs,
            &payload.total_epochs,
        ),
        current_batch: merge_value(
            FieldPolicy::OverwriteIfPresent,
            &prev.current_batch,
            &payload.current_batch,
        ),
        total_batches: merge_value(
            FieldPolicy::OverwriteIfPresent,
            &prev.total_batches,
            &payload.total_batches,
        ),
        elapsed_seconds: merge_value(
            FieldPolicy::OverwriteIfPresent,
            &prev.elapsed_seconds,
            &payload.elapsed_seconds,
        ),
        n_train: merge_value(FieldPolicy::OverwriteIfPresent, &prev.n_train, &payload.n_train),
        n_test: merge_value(FieldPolicy::OverwriteIfPresent, &prev.n_test, &payload.n_test),
        start_time: merge_value(
            FieldPolicy::OverwriteIfPresent,
            &prev.start_time,
            &payload.start_time,
        ),
        test_metrics: merge_sequence(&prev.test_metrics, &payload.test_metrics),
        instance_metrics: merge_value(
            FieldPolicy::OverwriteIfPresent,
            &prev.instance_metrics,
            &payload.instance_metrics,
        ),
        exported_artifact_id: merge_value(
            FieldPolicy::FillOnce,
            &prev.exported_artifact_id,
            &payload.exported_artifact_id,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InstanceMetrics, TestMetrics};
    use pretty_assertions::assert_eq;

    fn running() -> TrainingSession {
        TrainingSession::new("s1".into(), StatusType::Running)
    }

    #[test]
    fn absent_fields_keep_previous_values() {
        let first = StatusPayload {
            status_type: Some(StatusType::Running),
            current_epoch: Some(1),
            total_epochs: Some(10),
            train_losses: Some(vec![0.5]),
            n_train: Some(40),
            ..Default::default()
        };
        let second = StatusPayload {
            status_type: Some(StatusType::Running),
            current_batch: Some(3),
            ..Default::default()
        };

        let session = merge(&merge(&running(), &first), &second);
        assert_eq!(session.current_epoch, Some(1));
        assert_eq!(session.total_epochs, Some(10));
        assert_eq!(session.train_losses, vec![0.5]);
        assert_eq!(session.n_train, Some(40));
        assert_eq!(session.current_batch, Some(3));
    }

    #[test]
    fn present_fields_overwrite() {
        let mut prev = running();
        prev.train_losses = vec![0.5];
        prev.current_epoch = Some(1);
        let payload = StatusPayload {
            status_type: Some(StatusType::Running),
            train_losses: Some(vec![0.5, 0.4]),
            current_epoch: Some(2),
            ..Default::default()
        };
        let session = merge(&prev, &payload);
        assert_eq!(session.train_losses, vec![0.5, 0.4]);
        assert_eq!(session.current_epoch, Some(2));
    }

    #[test]
    fn dataset_artifact_is_fill_once() {
        let seeded = merge(
            &running(),
            &StatusPayload {
                dataset_artifact_id: Some("ws/dataset-a".into()),
                ..Default::default()
            },
        );
        assert_eq!(seeded.dataset_artifact_id.as_deref(), Some("ws/dataset-a"));

        let again = merge(
            &seeded,
            &StatusPayload {
                dataset_artifact_id: Some("ws/dataset-b".into()),
                ..Default::default()
            },
        );
        assert_eq!(again.dataset_artifact_id.as_deref(), Some("ws/dataset-a"));
    }

    #[test]
    fn stale_poll_does_not_clobber_export() {
        let mut prev = TrainingSession::new("s1".into(), StatusType::Completed);
        prev.exported_artifact_id = Some("ws/exported-local".into());
        let payload = StatusPayload {
            status_type: Some(StatusType::Completed),
            exported_artifact_id: Some("ws/exported-stale".into()),
            ..Default::default()
        };
        let session = merge(&prev, &payload);
        assert_eq!(
            session.exported_artifact_id.as_deref(),
            Some("ws/exported-local")
        );

        let fresh = merge(
            &TrainingSession::new("s1".into(), StatusType::Completed),
            &payload,
        );
        assert_eq!(
            fresh.exported_artifact_id.as_deref(),
            Some("ws/exported-stale")
        );
    }

    #[test]
    fn status_never_reverts() {
        let done = TrainingSession::new("s1".into(), StatusType::Completed);
        let session = merge(&done, &StatusPayload::with_status(StatusType::Running));
        assert_eq!(session.status_type, StatusType::Completed);

        let session = merge(&done, &StatusPayload::with_status(StatusType::Failed));
        assert_eq!(session.status_type, StatusType::Completed);

        let session = merge(&running(), &StatusPayload::with_status(StatusType::Preparing));
        assert_eq!(session.status_type, StatusType::Running);

        let session = merge(&running(), &StatusPayload::default());
        assert_eq!(session.status_type, StatusType::Running);
    }

    #[test]
    fn message_follows_the_kept_status() {
        let mut prev = running();
        prev.message = Some("epoch 2".into());

        let failed = merge(
            &prev,
            &StatusPayload {
                status_type: Some(StatusType::Failed),
                message: Some("CUDA out of memory".into()),
                ..Default::default()
            },
        );
        assert_eq!(failed.message.as_deref(), Some("CUDA out of memory"));

        let stale = merge(
            &failed,
            &StatusPayload {
                status_type: Some(StatusType::Running),
                message: Some("epoch 3".into()),
                ..Default::default()
            },
        );
        assert_eq!(stale.message.as_deref(), Some("CUDA out of memory"));
    }

    #[test]
    fn skipped_validation_epochs_survive_merge() {
        let metrics = TestMetrics {
            pixel_accuracy: 0.91,
            precision: 0.8,
            recall: 0.85,
            f1: 0.82,
            iou: 0.7,
        };
        let payload = StatusPayload {
            status_type: Some(StatusType::Completed),
            test_losses: Some(vec![Some(0.3), None, Some(0.25)]),
            test_metrics: Some(vec![Some(metrics), None, Some(metrics)]),
            instance_metrics: Some(InstanceMetrics {
                ap_0_5: 0.8,
                ap_0_75: 0.6,
                ap_0_9: 0.2,
                n_images: Some(4),
            }),
            ..Default::default()
        };
        let session = merge(&running(), &payload);
        assert_eq!(session.test_losses, vec![Some(0.3), None, Some(0.25)]);
        assert_eq!(session.test_metrics[1], None);
        assert!(session.instance_metrics.is_some());
    }

    #[test]
    fn every_payload_field_has_a_policy() {
        let payload = serde_json::to_value(StatusPayload::default()).unwrap();
        for key in payload.as_object().unwrap().keys() {
            assert!(policy_for(key).is_some(), "no merge policy for {key}");
        }
        assert_eq!(policy_for("dataset_artifact_id"), Some(FieldPolicy::FillOnce));
        assert_eq!(policy_for("status_type"), Some(FieldPolicy::AlwaysLatest));
    }
}
