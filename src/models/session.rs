//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Login session; the id doubles as the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, user_id: i64, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            expires_at: now + lifetime,
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let live = Session::new("a".into(), 1, Duration::days(7));
        assert!(!live.is_expired());

        let dead = Session::new("b".into(), 1, Duration::seconds(-1));
        assert!(dead.is_expired());
    }
}
