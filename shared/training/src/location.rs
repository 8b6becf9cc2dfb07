use tracing::debug;

use crate::session::SessionId;

const ROUTE_PREFIX: &str = "/train/";

/// Where the monitored session id is published so a later run can resume it.
pub trait LocationSink: Send + Sync {
    fn set_session(&self, session_id: &SessionId);
}

/// Location sink that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogLocation;

impl LocationSink for LogLocation {
    fn set_session(&self, session_id: &SessionId) {
        debug!(route = session_route(session_id), "Session location updated");
    }
}

pub fn session_route(session_id: &SessionId) -> String {
    format!("{ROUTE_PREFIX}{session_id}")
}

/// Accepts a bare session id, a `/train/<id>` route, or any URL containing
/// such a route (including hash routes like `https://host/#/train/<id>`).
pub fn parse_session_route(input: &str) -> Option<SessionId> {
    let input = input.trim();
    let candidate = match input.rfind(ROUTE_PREFIX) {
        Some(idx) => &input[idx + ROUTE_PREFIX.len()..],
        None if input.contains('/') => return None,
        None => input,
    };
    let candidate = candidate
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');

    if candidate.is_empty() || candidate.contains('/') {
        None
    } else {
        Some(SessionId::new(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_round_trips_through_urls() {
        let id = SessionId::new("a1b2c3");
        assert_eq!(session_route(&id), "/train/a1b2c3");
        assert_eq!(parse_session_route("/train/a1b2c3"), Some(id.clone()));
        assert_eq!(
            parse_session_route("https://bioimage.io/#/train/a1b2c3?tab=metrics"),
            Some(id.clone())
        );
        assert_eq!(parse_session_route("a1b2c3"), Some(id));
    }

    #[test]
    fn rejects_routes_without_a_session() {
        assert_eq!(parse_session_route(""), None);
        assert_eq!(parse_session_route("/train/"), None);
        assert_eq!(parse_session_route("/models/abc"), None);
        assert_eq!(parse_session_route("/train/a/b"), None);
    }
}
