// File: relaybot-core/src/repositories/postgres/logs.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use relaybot_common::error::Error;
use relaybot_common::models::{CommandExecutionRecord, ErrorOrigin, ErrorRecord, LogEntry};
use relaybot_common::traits::sink_traits::LogSink;

pub struct PostgresLogSink {
    pub pool: Pool<Postgres>,
}

impl PostgresLogSink {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for PostgresLogSink {
    async fn log_command_execution(&self, record: CommandExecutionRecord) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO command_executions (
                execution_id, user_id, command, platform, channel_id, executed_at,
                success, invocation, arguments, result, execution_time_ms
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
            .bind(record.execution_id)
            .bind(record.user_id)
            .bind(&record.command)
            .bind(record.platform.to_string())
            .bind(record.channel_id)
            .bind(record.executed_at)
            .bind(record.success)
            .bind(&record.invocation)
            .bind(serde_json::to_value(&record.arguments)?)
            .bind(&record.result)
            .bind(record.execution_time_ms)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log_error(&self, record: ErrorRecord) -> Result<(), Error> {
        let origin = match record.origin {
            ErrorOrigin::External => "External",
            ErrorOrigin::Internal => "Internal",
        };
        sqlx::query(
            r#"
            INSERT INTO error_log (error_id, kind, origin, message, context, created_at)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
            .bind(record.error_id)
            .bind(&record.kind)
            .bind(origin)
            .bind(&record.message)
            .bind(&record.context)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log(&self, entry: LogEntry) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO log_entries (tag, description, channel_id, user_id, created_at)
            VALUES ($1,$2,$3,$4,$5)
            "#,
        )
            .bind(&entry.tag)
            .bind(&entry.description)
            .bind(entry.channel_id)
            .bind(entry.user_id)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
