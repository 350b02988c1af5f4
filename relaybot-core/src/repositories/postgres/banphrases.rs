// File: relaybot-core/src/repositories/postgres/banphrases.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use relaybot_common::error::Error;
use relaybot_common::models::BanphraseRecord;
use relaybot_common::traits::repository_traits::BanphraseRepository;

pub struct PostgresBanphraseRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresBanphraseRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanphraseRepository for PostgresBanphraseRepository {
    async fn list_active(&self) -> Result<Vec<BanphraseRecord>, Error> {
        let rows = sqlx::query_as::<_, BanphraseRecord>(
            r#"
            SELECT banphrase_id, code, banphrase_type, platform, channel_id, active, priority, description
            FROM banphrases
            WHERE active = TRUE AND banphrase_type <> 'Inactive'
            ORDER BY priority DESC, banphrase_id
            "#,
        )
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<BanphraseRecord>, Error> {
        let rows = sqlx::query_as::<_, BanphraseRecord>(
            r#"
            SELECT banphrase_id, code, banphrase_type, platform, channel_id, active, priority, description
            FROM banphrases
            WHERE banphrase_id = ANY($1)
            "#,
        )
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn set_active(&self, banphrase_id: i64, active: bool) -> Result<(), Error> {
        let result = sqlx::query("UPDATE banphrases SET active = $1 WHERE banphrase_id = $2")
            .bind(active)
            .bind(banphrase_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Banphrase {} does not exist", banphrase_id)));
        }
        Ok(())
    }
}
