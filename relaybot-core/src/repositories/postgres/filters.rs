// File: relaybot-core/src/repositories/postgres/filters.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use relaybot_common::error::Error;
use relaybot_common::models::{FilterRecord, NewFilter};
use relaybot_common::traits::repository_traits::FilterRepository;

const FILTER_COLUMNS: &str = r#"
    filter_id,
    filter_type,
    user_id,
    channel_id,
    command,
    invocation,
    platform,
    data,
    response,
    reason,
    active,
    blocked_user_id,
    issued_by,
    created_at
"#;

pub struct PostgresFilterRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresFilterRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilterRepository for PostgresFilterRepository {
    async fn list_active(&self) -> Result<Vec<FilterRecord>, Error> {
        let sql = format!("SELECT {} FROM filters WHERE active = TRUE ORDER BY filter_id", FILTER_COLUMNS);
        let rows = sqlx::query_as::<_, FilterRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<FilterRecord>, Error> {
        let sql = format!("SELECT {} FROM filters WHERE filter_id = ANY($1) ORDER BY filter_id", FILTER_COLUMNS);
        let rows = sqlx::query_as::<_, FilterRecord>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn create(&self, filter: &NewFilter) -> Result<FilterRecord, Error> {
        let filter_type = filter
            .filter_type
            .ok_or_else(|| Error::Parse("Filter type is required".into()))?;

        let sql = format!(
            r#"
            INSERT INTO filters (
                filter_type, user_id, channel_id, command, invocation, platform,
                data, response, reason, active, blocked_user_id, issued_by, created_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,TRUE,$10,$11,NOW())
            RETURNING {}
            "#,
            FILTER_COLUMNS
        );
        let row = sqlx::query_as::<_, FilterRecord>(&sql)
            .bind(filter_type.to_string())
            .bind(filter.user)
            .bind(filter.channel)
            .bind(&filter.command)
            .bind(&filter.invocation)
            .bind(filter.platform.map(|p| p.to_string()))
            .bind(&filter.data)
            .bind(filter.response.to_string())
            .bind(&filter.reason)
            .bind(filter.blocked_user)
            .bind(filter.issued_by)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn set_active(&self, filter_id: i64, active: bool) -> Result<(), Error> {
        let result = sqlx::query("UPDATE filters SET active = $1 WHERE filter_id = $2")
            .bind(active)
            .bind(filter_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Filter {} does not exist", filter_id)));
        }
        Ok(())
    }

    async fn set_reason(&self, filter_id: i64, reason: Option<&str>) -> Result<(), Error> {
        let result = sqlx::query("UPDATE filters SET reason = $1 WHERE filter_id = $2")
            .bind(reason)
            .bind(filter_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Filter {} does not exist", filter_id)));
        }
        Ok(())
    }
}
