use async_trait::async_trait;
use tracing::{error, info};
use relaybot_common::models::{CommandExecutionRecord, ErrorRecord, LogEntry};
use relaybot_common::traits::sink_traits::LogSink;
use crate::Error;

/// Writes log records as tracing events only. Used when no database is
/// configured.
#[derive(Debug, Default, Clone)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn log_command_execution(&self, record: CommandExecutionRecord) -> Result<(), Error> {
        info!(
            command = %record.command,
            user = record.user_id,
            channel = ?record.channel_id,
            success = record.success,
            ms = record.execution_time_ms,
            "command executed"
        );
        Ok(())
    }

    async fn log_error(&self, record: ErrorRecord) -> Result<(), Error> {
        error!(
            error_id = %record.error_id,
            kind = %record.kind,
            origin = ?record.origin,
            context = %record.context,
            "{}",
            record.message
        );
        Ok(())
    }

    async fn log(&self, entry: LogEntry) -> Result<(), Error> {
        info!(tag = %entry.tag, channel = ?entry.channel_id, user = ?entry.user_id, "{}", entry.description);
        Ok(())
    }
}
