use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::models::platform::Platform;

/// One executed (or attempted) command, as handed to the logging sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExecutionRecord {
    pub execution_id: Uuid,
    pub user_id: i64,
    pub command: String,
    pub platform: Platform,
    pub channel_id: Option<i64>,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub invocation: String,
    pub arguments: Vec<String>,
    /// Reply text, truncated.
    pub result: Option<String>,
    pub execution_time_ms: f64,
}

/// Where an error came from, as far as the user-facing reply is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorOrigin {
    /// A third-party service the command depends on failed.
    External,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_id: Uuid,
    /// Subsystem tag, e.g. `Command`.
    pub kind: String,
    pub origin: ErrorOrigin,
    pub message: String,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A free-form audit line, e.g. a banphrase API denial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub tag: String,
    pub description: String,
    pub channel_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(tag: &str, description: impl Into<String>, channel_id: Option<i64>, user_id: Option<i64>) -> Self {
        Self {
            tag: tag.to_string(),
            description: description.into(),
            channel_id,
            user_id,
            created_at: Utc::now(),
        }
    }
}
