use async_trait::async_trait;
use crate::error::Error;
use crate::models::{BanphraseRecord, CommandDefinition, FilterRecord, NewFilter};

#[async_trait]
pub trait FilterRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<FilterRecord>, Error>;

    /// Returns whichever of `ids` exist, active or not.
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<FilterRecord>, Error>;

    async fn create(&self, filter: &NewFilter) -> Result<FilterRecord, Error>;
    async fn set_active(&self, filter_id: i64, active: bool) -> Result<(), Error>;
    async fn set_reason(&self, filter_id: i64, reason: Option<&str>) -> Result<(), Error>;
}

#[async_trait]
pub trait BanphraseRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<BanphraseRecord>, Error>;
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<BanphraseRecord>, Error>;
    async fn set_active(&self, banphrase_id: i64, active: bool) -> Result<(), Error>;
}

#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn list_definitions(&self) -> Result<Vec<CommandDefinition>, Error>;
    async fn get_definition(&self, name: &str) -> Result<Option<CommandDefinition>, Error>;
}
