// File: relaybot-core/src/services/mod.rs

pub mod banphrase;
pub mod builtin_commands;
pub mod command;
pub mod cooldown;
pub mod filter;
pub mod log_sink;
pub mod metrics;

pub use banphrase::BanphraseEngine;
pub use command::{CommandRegistry, Dispatcher};
pub use cooldown::CooldownManager;
pub use filter::FilterRegistry;
