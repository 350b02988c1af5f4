// File: relaybot-core/src/repositories/postgres/commands.rs

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;
use relaybot_common::error::Error;
use relaybot_common::models::CommandDefinition;
use relaybot_common::traits::repository_traits::CommandRepository;

/// Command definitions are stored as one JSON document per name.
pub struct PostgresCommandRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresCommandRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a definition.
    pub async fn upsert_definition(&self, definition: &CommandDefinition) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO command_definitions (name, definition, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE
            SET definition = EXCLUDED.definition, updated_at = NOW()
            "#,
        )
            .bind(&definition.name)
            .bind(serde_json::to_value(definition)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_definition(name: &str, raw: Value) -> Option<CommandDefinition> {
    match serde_json::from_value::<CommandDefinition>(raw) {
        Ok(def) => Some(def),
        Err(e) => {
            warn!("Stored definition of command '{}' is invalid: {}", name, e);
            None
        }
    }
}

#[async_trait]
impl CommandRepository for PostgresCommandRepository {
    async fn list_definitions(&self) -> Result<Vec<CommandDefinition>, Error> {
        let rows = sqlx::query("SELECT name, definition FROM command_definitions ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let name: String = r.try_get("name")?;
            let raw: Value = r.try_get("definition")?;
            out.extend(parse_definition(&name, raw));
        }
        Ok(out)
    }

    async fn get_definition(&self, name: &str) -> Result<Option<CommandDefinition>, Error> {
        let row_opt = sqlx::query("SELECT name, definition FROM command_definitions WHERE LOWER(name) = LOWER($1)")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(r) = row_opt {
            let name: String = r.try_get("name")?;
            let raw: Value = r.try_get("definition")?;
            Ok(parse_definition(&name, raw))
        } else {
            Ok(None)
        }
    }
}
