//! Session lifecycle
//!
//! Expiry is a derived property, never stored: a session is expired once
//! the corrected clock says more than the TTL has passed since the last
//! recorded activity. Any action that depends on a live session re-fetches
//! the record and re-checks this before writing.

use chrono::{DateTime, Utc};

use crate::store::SessionRecord;

/// Which of the client's top-level views is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionView {
    /// No session id in scope; offer creation.
    Landing,
    /// Session loaded, participant not yet joined.
    Join,
    /// Joined and voting.
    Table,
    /// Session missing or past its TTL.
    Expired,
}

/// Strictly-greater TTL check: at exactly the TTL boundary the session is
/// still live.
pub fn is_expired(record: &SessionRecord, now: DateTime<Utc>, ttl_secs: u64) -> bool {
    let ttl = chrono::Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64);
    now.signed_duration_since(record.last_activity_at) > ttl
}

/// Extract the session id from a `/s/<id>` URL path.
///
/// Anything else addresses the landing view.
pub fn session_id_from_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/s/")?;
    let id = rest.split('/').next().unwrap_or("");
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SESSION_TTL_SECS;

    fn record_active_at(last_activity: DateTime<Utc>) -> SessionRecord {
        SessionRecord::new("s1", last_activity)
    }

    #[test]
    fn test_not_expired_at_exactly_the_ttl() {
        let now = Utc::now();
        let record = record_active_at(now - chrono::Duration::hours(3));
        assert!(!is_expired(&record, now, DEFAULT_SESSION_TTL_SECS));
    }

    #[test]
    fn test_expired_one_second_past_the_ttl() {
        let now = Utc::now();
        let record =
            record_active_at(now - chrono::Duration::hours(3) - chrono::Duration::seconds(1));
        assert!(is_expired(&record, now, DEFAULT_SESSION_TTL_SECS));
    }

    #[test]
    fn test_fresh_session_is_live() {
        let now = Utc::now();
        let record = record_active_at(now);
        assert!(!is_expired(&record, now, DEFAULT_SESSION_TTL_SECS));
    }

    #[test]
    fn test_session_id_from_path() {
        assert_eq!(session_id_from_path("/s/abc-123"), Some("abc-123"));
        assert_eq!(session_id_from_path("/s/abc/extra"), Some("abc"));
        assert_eq!(session_id_from_path("/s/"), None);
        assert_eq!(session_id_from_path("/"), None);
        assert_eq!(session_id_from_path("/other/abc"), None);
    }
}
