//! What a command handler receives and what it hands back.

use std::sync::Arc;
use async_trait::async_trait;
use thiserror::Error;

use relaybot_common::models::{Channel, CommandDefinition, Platform, User};
use relaybot_common::traits::chat_traits::ChatPlatform;
use relaybot_common::traits::transaction_traits::CommandTransaction;
use crate::services::command::params::Parameters;

/// Marks a handler failure as caused by a third-party service, so the user is
/// told that rather than getting an internal error reply.
#[derive(Debug, Error)]
#[error("External request to {service} failed: {message}")]
pub struct ExternalRequestError {
    pub service: String,
    pub message: String,
}

impl ExternalRequestError {
    pub fn new(service: &str, message: impl Into<String>) -> Self {
        Self { service: service.to_string(), message: message.into() }
    }
}

/// Per-invocation metadata that travels along pipes and aliases.
#[derive(Debug, Clone, Default)]
pub struct ContextAppend {
    /// The invocation is one stage of a pipe.
    pub pipe: bool,
    /// Outputs of earlier pipe stages.
    pub tee: Vec<String>,
    /// How many aliases deep this invocation is nested.
    pub alias_depth: u32,
    pub alias_stack: Vec<String>,
    pub private_message: bool,
    pub skip_banphrase_api: bool,
}

pub struct Context {
    pub command: CommandDefinition,
    pub invocation: String,
    pub user: User,
    pub channel: Option<Channel>,
    pub platform: Arc<dyn ChatPlatform>,
    /// Present only for `rollback` commands.
    pub transaction: Option<Box<dyn CommandTransaction>>,
    pub params: Parameters,
    pub append: ContextAppend,
}

impl Context {
    pub fn platform_kind(&self) -> Platform {
        self.platform.platform()
    }

    pub fn is_private(&self) -> bool {
        self.channel.is_none()
    }
}

/// One piece of a reply assembled from several parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialReply {
    pub message: String,
    /// Run this part through banphrases on its own.
    pub bancheck: bool,
}

/// Cooldown scope fields a handler may override. `None` keeps the default
/// for that field; `Some(None)` makes it a wildcard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooldownSpec {
    pub channel: Option<Option<i64>>,
    pub user: Option<Option<i64>>,
    pub command: Option<Option<String>>,
    pub length: Option<u64>,
    pub ignore_cooldown_filters: bool,
}

/// What cooldown to apply after the handler ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CooldownOverride {
    /// The command's own cooldown, adjusted by cooldown filters.
    #[default]
    Default,
    /// No cooldown at all.
    Disabled,
    Length(u64),
    Custom(CooldownSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionMeta {
    pub skip_banphrase: bool,
}

/// A handler's result. Everything besides the reply is optional.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    /// Defaults to `true` when unset.
    pub success: Option<bool>,
    pub reply: Option<String>,
    pub partial_replies: Option<Vec<PartialReply>>,
    pub cooldown: CooldownOverride,
    pub reply_with_private_message: Option<bool>,
    pub is_channel_alias: bool,
    pub has_external_input: bool,
    pub skip_external_prefix: bool,
    pub force_external_prefix: bool,
    pub meta: ExecutionMeta,
}

impl Execution {
    pub fn reply(text: impl Into<String>) -> Self {
        Self { reply: Some(text.into()), ..Self::default() }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self { success: Some(false), reply: Some(text.into()), ..Self::default() }
    }

    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true)
    }
}

/// The executable body of a command, compiled into the binary and registered
/// under the command's name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: &mut Context, args: &[String]) -> anyhow::Result<Execution>;

    /// Runs when the command is installed, including after a reload.
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs before the command is replaced or removed.
    async fn destroy(&self) {}
}
