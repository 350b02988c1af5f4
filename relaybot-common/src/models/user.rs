use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat user as known to the bot. IDs are shared across platforms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: i64,
    /// Lowercase login name.
    pub name: String,
    pub first_seen: DateTime<Utc>,
}

impl User {
    pub fn new(user_id: i64, name: &str) -> Self {
        Self {
            user_id,
            name: name.to_lowercase(),
            first_seen: Utc::now(),
        }
    }
}
