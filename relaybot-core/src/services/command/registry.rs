//! Command definitions joined with their compiled handlers.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use relaybot_common::models::CommandDefinition;
use relaybot_common::traits::repository_traits::CommandRepository;
use crate::services::command::context::CommandHandler;
use crate::Error;

/// Name → handler table of every command body compiled into the binary.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn CommandHandler>) -> &mut Self {
        self.handlers.insert(name.to_lowercase(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

pub struct RegisteredCommand {
    pub definition: CommandDefinition,
    pub handler: Arc<dyn CommandHandler>,
}

#[derive(Default)]
struct CommandMap {
    by_name: HashMap<String, Arc<RegisteredCommand>>,
    /// Lowercased alias → lowercased command name.
    aliases: HashMap<String, String>,
}

impl CommandMap {
    fn build(commands: impl IntoIterator<Item = Arc<RegisteredCommand>>) -> Self {
        let mut map = CommandMap::default();
        for command in commands {
            let name = command.definition.name.to_lowercase();
            for alias in &command.definition.aliases {
                map.aliases.insert(alias.to_lowercase(), name.clone());
            }
            map.by_name.insert(name, command);
        }
        map
    }
}

pub struct CommandRegistry {
    commands: RwLock<Arc<CommandMap>>,
    handlers: HandlerTable,
    repo: Option<Arc<dyn CommandRepository>>,
}

impl CommandRegistry {
    pub fn new(handlers: HandlerTable) -> Self {
        Self {
            commands: RwLock::new(Arc::new(CommandMap::default())),
            handlers,
            repo: None,
        }
    }

    pub fn with_repository(mut self, repo: Arc<dyn CommandRepository>) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Looks a command up by name or alias, case-insensitively.
    pub fn get(&self, identifier: &str) -> Option<Arc<RegisteredCommand>> {
        let key = identifier.to_lowercase();
        let map = self.commands.read().clone();
        map.by_name
            .get(&key)
            .or_else(|| map.aliases.get(&key).and_then(|name| map.by_name.get(name)))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.commands.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().by_name.values().map(|c| c.definition.name.clone()).collect();
        names.sort();
        names
    }

    fn join(&self, definition: CommandDefinition) -> Option<Arc<RegisteredCommand>> {
        match self.handlers.get(&definition.name) {
            Some(handler) => Some(Arc::new(RegisteredCommand { definition, handler })),
            None => {
                warn!("Command '{}' has no registered handler; skipping it", definition.name);
                None
            }
        }
    }

    /// Tears down `old`, initializes `fresh`, and returns the ones that initialized.
    async fn cycle(
        old: Vec<Arc<RegisteredCommand>>,
        fresh: Vec<Arc<RegisteredCommand>>,
    ) -> Vec<Arc<RegisteredCommand>> {
        for command in old {
            command.handler.destroy().await;
        }

        let mut ready = Vec::with_capacity(fresh.len());
        for command in fresh {
            match command.handler.initialize().await {
                Ok(()) => ready.push(command),
                Err(e) => error!("Command '{}' failed to initialize: {:?}", command.definition.name, e),
            }
        }
        ready
    }

    /// Replaces every command with `definitions`.
    pub async fn install(&self, definitions: Vec<CommandDefinition>) -> usize {
        let fresh: Vec<_> = definitions.into_iter().filter_map(|d| self.join(d)).collect();
        let old: Vec<_> = self.commands.read().by_name.values().cloned().collect();

        let ready = Self::cycle(old, fresh).await;
        let map = CommandMap::build(ready);
        let count = map.by_name.len();
        *self.commands.write() = Arc::new(map);
        count
    }

    pub async fn reload_all(&self) -> Result<usize, Error> {
        let repo = self
            .repo
            .as_ref()
            .ok_or_else(|| Error::Config("Command registry has no repository".into()))?;
        let definitions = repo.list_definitions().await?;
        let count = self.install(definitions).await;
        info!("Loaded {} commands", count);
        Ok(count)
    }

    /// Re-reads the named commands. Names no longer defined are removed.
    pub async fn reload_specific(&self, names: &[String]) -> Result<(), Error> {
        let repo = self
            .repo
            .as_ref()
            .ok_or_else(|| Error::Config("Command registry has no repository".into()))?;

        let mut fresh = Vec::new();
        for name in names {
            if let Some(definition) = repo.get_definition(name).await? {
                fresh.extend(self.join(definition));
            }
        }

        let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        let current = self.commands.read().clone();
        let (old, kept): (Vec<_>, Vec<_>) = current
            .by_name
            .iter()
            .partition(|(name, _)| lowered.contains(*name));
        let old: Vec<_> = old.into_iter().map(|(_, c)| c.clone()).collect();
        let mut commands: Vec<_> = kept.into_iter().map(|(_, c)| c.clone()).collect();

        commands.extend(Self::cycle(old, fresh).await);
        *self.commands.write() = Arc::new(CommandMap::build(commands));
        debug!("Reloaded commands {:?}", names);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use crate::services::command::context::{Context, Execution};

    #[derive(Default)]
    struct Counting {
        initialized: AtomicUsize,
        destroyed: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler for Counting {
        async fn execute(&self, _ctx: &mut Context, _args: &[String]) -> anyhow::Result<Execution> {
            Ok(Execution::reply("ok"))
        }

        async fn initialize(&self) -> anyhow::Result<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_install_resolves_aliases_and_skips_unknown() {
        let handler = Arc::new(Counting::default());
        let mut table = HandlerTable::new();
        table.register("ping", handler.clone());
        let registry = CommandRegistry::new(table);

        let mut ping = CommandDefinition::new("ping");
        ping.aliases.push("pong".into());
        let count = registry.install(vec![ping, CommandDefinition::new("ghost")]).await;

        assert_eq!(count, 1);
        assert!(registry.get("PONG").is_some());
        assert!(registry.get("ghost").is_none());
        assert_eq!(handler.initialized.load(Ordering::SeqCst), 1);

        // reinstalling tears the old instance down first
        registry.install(vec![CommandDefinition::new("ping")]).await;
        assert_eq!(handler.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(handler.initialized.load(Ordering::SeqCst), 2);
        assert!(registry.get("pong").is_none());
    }
}
