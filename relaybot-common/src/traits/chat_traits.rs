//! Narrow views of the platform connectors and the user/channel stores that
//! command dispatch depends on.

use async_trait::async_trait;
use serde_json::Value;
use crate::error::Error;
use crate::models::{Channel, Platform, User};

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    fn platform(&self) -> Platform;

    /// Sends a private message to `user`.
    async fn pm(&self, text: &str, user: &User) -> Result<(), Error>;

    /// Text that addresses `user` in a channel message, e.g. `@name`.
    fn create_user_mention(&self, user: &User) -> String;

    async fn is_user_channel_owner(&self, channel: &Channel, user: &User) -> Result<bool, Error>;
}

/// Loose per-channel and per-user settings (`administrator`, stream state, ...).
#[async_trait]
pub trait DataPropertyStore: Send + Sync {
    async fn channel_property(&self, channel: &Channel, name: &str) -> Result<Option<Value>, Error>;
    async fn user_property(&self, user: &User, name: &str) -> Result<Option<Value>, Error>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, user_id: i64) -> Result<Option<User>, Error>;
    async fn get_by_name(&self, name: &str) -> Result<Option<User>, Error>;
}
