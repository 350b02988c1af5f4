use async_trait::async_trait;
use crate::error::Error;
use crate::models::{CommandExecutionRecord, ErrorRecord, LogEntry};

/// Persistent audit/error logging. Callers spawn these calls and never wait
/// on them on the reply path, so implementations may be slow.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn log_command_execution(&self, record: CommandExecutionRecord) -> Result<(), Error>;
    async fn log_error(&self, record: ErrorRecord) -> Result<(), Error>;
    async fn log(&self, entry: LogEntry) -> Result<(), Error>;
}

pub trait MetricsSink: Send + Sync {
    /// Bumps counter `name` for `command`.
    fn increment(&self, name: &str, command: &str);
}
