//! Commands compiled into every build.

mod echo;
mod ping;

use std::collections::HashSet;
use std::sync::Arc;
use relaybot_common::models::{CommandDefinition, CommandFlag};
use crate::services::command::registry::HandlerTable;

pub use echo::EchoCommand;
pub use ping::PingCommand;

/// Registers the built-in handlers in `table`.
pub fn register_builtins(table: &mut HandlerTable) {
    table
        .register("ping", Arc::new(PingCommand::new()))
        .register("echo", Arc::new(EchoCommand));
}

/// Definitions used when no command catalog is stored in the database.
pub fn builtin_definitions() -> Vec<CommandDefinition> {
    let mut ping = CommandDefinition::new("ping");
    ping.aliases = vec!["pong".to_string()];
    ping.description = Some("Checks whether the bot is alive and for how long.".to_string());
    ping.cooldown = Some(5000);
    ping.flags = HashSet::from([CommandFlag::Pipe]);

    let mut echo = CommandDefinition::new("echo");
    echo.aliases = vec!["say".to_string()];
    echo.description = Some("Repeats its input.".to_string());
    echo.cooldown = Some(5000);
    echo.flags = HashSet::from([CommandFlag::ExternalInput, CommandFlag::Pipe, CommandFlag::Mention]);

    vec![ping, echo]
}
