//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One authenticated client-server relationship.
///
/// Sessions are immutable once stored; the only lifecycle transition after
/// creation is deletion (logout, logout-all, lazy expiry or the sweeper).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Store-assigned surrogate identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Owning user's username, copied at creation
    pub username: String,
    /// Opaque bearer token presented by the client
    #[serde(skip_serializing)]
    pub token: String,
    /// Absolute expiry; the session is valid strictly before this instant
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check whether the session is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: 1,
            user_id: 1,
            username: "alice".to_string(),
            token: "token".to_string(),
            expires_at,
            created_at: expires_at - Duration::hours(1),
        }
    }

    #[test]
    fn test_session_expiration_check() {
        let now = Utc::now();

        assert!(session_expiring_at(now - Duration::hours(1)).is_expired_at(now));
        assert!(!session_expiring_at(now + Duration::hours(1)).is_expired_at(now));
    }

    #[test]
    fn test_session_expires_exactly_at_deadline() {
        let now = Utc::now();
        assert!(session_expiring_at(now).is_expired_at(now));
    }

    #[test]
    fn test_token_not_serialized() {
        let session = session_expiring_at(Utc::now());
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["username"], "alice");
    }
}
