//! Runtime settings for the dispatch pipeline.
//!
//! Every struct deserializes with defaults so a config file only has to name
//! what it changes:
//! ```json
//! { "dispatcher": { "privileged_prefixes": ["$", "!"] }, "banphrase": { "api_timeout_ms": 2000 } }
//! ```

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Single-character commands that may be glued to their first argument,
    /// e.g. `$$alias` runs `$` with `alias` as the first argument.
    pub privileged_prefixes: Vec<String>,
    /// Token that stops parameter parsing; everything after it is passed verbatim.
    pub parameter_delimiter: String,
    /// Compile `regex` parameters in linear-time mode.
    pub regex_linear_mode: bool,
    /// Bound on compiled regex parameter size in linear-time mode, in bytes.
    pub regex_size_limit: usize,
    /// Maximum characters of a reply kept in the execution log.
    pub log_result_length: usize,
    pub channel_alias_prefix: String,
    pub external_input_prefix: String,
    /// Used in place of a mention that did not pass banphrases.
    pub banphrased_mention: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            privileged_prefixes: vec!["$".to_string()],
            parameter_delimiter: "--".to_string(),
            regex_linear_mode: false,
            regex_size_limit: 1 << 20,
            log_result_length: 300,
            channel_alias_prefix: "🅰".to_string(),
            external_input_prefix: "👥".to_string(),
            banphrased_mention: "[Banphrased username]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// How long a pending guard lives if the invocation never clears it.
    pub pending_timeout_ms: u64,
    pub prune_interval_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            pending_timeout_ms: 5 * 60 * 1000,
            prune_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanphraseConfig {
    pub api_timeout_ms: u64,
    /// Characters of the message sent to the moderation API.
    pub api_message_limit: usize,
    /// Reply used when the API bans a message and no `API response` rule matches.
    pub default_api_response: String,
    /// Prepended to messages sent under the `Notify` downtime policy.
    pub downtime_warning: String,
}

impl Default for BanphraseConfig {
    fn default() -> Self {
        Self {
            api_timeout_ms: 5000,
            api_message_limit: 1000,
            default_api_response: "Cannot reply - the message contains a banned phrase.".to_string(),
            downtime_warning: "⚠".to_string(),
        }
    }
}

/// Everything the bot reads from its config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub dispatcher: DispatcherConfig,
    pub cooldown: CooldownConfig,
    pub banphrase: BanphraseConfig,
}

impl BotConfig {
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg = BotConfig::from_json_str(r#"{ "dispatcher": { "privileged_prefixes": ["!"] } }"#).unwrap();
        assert_eq!(cfg.dispatcher.privileged_prefixes, vec!["!".to_string()]);
        assert_eq!(cfg.dispatcher.parameter_delimiter, "--");
        assert_eq!(cfg.cooldown.pending_timeout_ms, 300_000);
        assert_eq!(cfg.banphrase.api_message_limit, 1000);
    }

    #[test]
    fn test_module_example_parses() {
        let cfg = BotConfig::from_json_str(
            r#"{ "dispatcher": { "privileged_prefixes": ["$", "!"] }, "banphrase": { "api_timeout_ms": 2000 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.dispatcher.privileged_prefixes.len(), 2);
        assert_eq!(cfg.banphrase.api_timeout_ms, 2000);
    }

    #[test]
    fn test_malformed_config_is_a_config_error() {
        assert!(matches!(BotConfig::from_json_str("{ nope"), Err(Error::Config(_))));
    }
}
