// File: relaybot-core/tests/test_utils/mod.rs
#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use relaybot_common::models::{
    BanphraseRecord, Channel, CommandDefinition, CommandExecutionRecord, ErrorRecord, FilterRecord, LogEntry,
    NewFilter, Platform, User,
};
use relaybot_common::traits::chat_traits::{ChatPlatform, DataPropertyStore, UserDirectory};
use relaybot_common::traits::repository_traits::{BanphraseRepository, CommandRepository, FilterRepository};
use relaybot_common::traits::sink_traits::LogSink;
use relaybot_common::traits::transaction_traits::{CommandTransaction, TransactionProvider};
use relaybot_core::config::BotConfig;
use relaybot_core::http::{BanphraseData, ModerationApi, ModerationError, ModerationVerdict};
use relaybot_core::services::banphrase::PredicateTable;
use relaybot_core::services::command::{CommandHandler, Dispatcher, HandlerTable, Invocation, InvocationOptions};
use relaybot_core::services::metrics::CounterMetrics;
use relaybot_core::services::{BanphraseEngine, CommandRegistry, CooldownManager, FilterRegistry};
use relaybot_core::Error;

/// Filters kept in a vector, ids handed out in insertion order.
#[derive(Default)]
pub struct MemoryFilterRepository {
    pub rows: Mutex<Vec<FilterRecord>>,
    next_id: AtomicI64,
}

impl MemoryFilterRepository {
    pub fn new() -> Self {
        Self { rows: Mutex::new(Vec::new()), next_id: AtomicI64::new(1) }
    }

    pub fn row(&self, filter_id: i64) -> Option<FilterRecord> {
        self.rows.lock().unwrap().iter().find(|r| r.filter_id == filter_id).cloned()
    }

    /// Edits a stored row behind the registry's back.
    pub fn update(&self, filter_id: i64, edit: impl FnOnce(&mut FilterRecord)) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.filter_id == filter_id) {
            edit(row);
        }
    }
}

#[async_trait]
impl FilterRepository for MemoryFilterRepository {
    async fn list_active(&self) -> Result<Vec<FilterRecord>, Error> {
        Ok(self.rows.lock().unwrap().iter().filter(|r| r.active).cloned().collect())
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<FilterRecord>, Error> {
        Ok(self.rows.lock().unwrap().iter().filter(|r| ids.contains(&r.filter_id)).cloned().collect())
    }

    async fn create(&self, filter: &NewFilter) -> Result<FilterRecord, Error> {
        let filter_type = filter.filter_type.ok_or_else(|| Error::Parse("Filter type is required".into()))?;
        let record = FilterRecord {
            filter_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            filter_type: filter_type.to_string(),
            user_id: filter.user,
            channel_id: filter.channel,
            command: filter.command.clone(),
            invocation: filter.invocation.clone(),
            platform: filter.platform.map(|p| p.to_string()),
            data: filter.data.clone(),
            response: filter.response.to_string(),
            reason: filter.reason.clone(),
            active: true,
            blocked_user_id: filter.blocked_user,
            issued_by: filter.issued_by,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn set_active(&self, filter_id: i64, active: bool) -> Result<(), Error> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.filter_id == filter_id)
            .ok_or_else(|| Error::NotFound(format!("Filter {} does not exist", filter_id)))?;
        row.active = active;
        Ok(())
    }

    async fn set_reason(&self, filter_id: i64, reason: Option<&str>) -> Result<(), Error> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.filter_id == filter_id)
            .ok_or_else(|| Error::NotFound(format!("Filter {} does not exist", filter_id)))?;
        row.reason = reason.map(str::to_string);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBanphraseRepository {
    pub rows: Mutex<Vec<BanphraseRecord>>,
}

#[async_trait]
impl BanphraseRepository for MemoryBanphraseRepository {
    async fn list_active(&self) -> Result<Vec<BanphraseRecord>, Error> {
        Ok(self.rows.lock().unwrap().iter().filter(|r| r.active).cloned().collect())
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<BanphraseRecord>, Error> {
        Ok(self.rows.lock().unwrap().iter().filter(|r| ids.contains(&r.banphrase_id)).cloned().collect())
    }

    async fn set_active(&self, banphrase_id: i64, active: bool) -> Result<(), Error> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.banphrase_id == banphrase_id)
            .ok_or_else(|| Error::NotFound(format!("Banphrase {} does not exist", banphrase_id)))?;
        row.active = active;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCommandRepository {
    pub definitions: Mutex<Vec<CommandDefinition>>,
}

#[async_trait]
impl CommandRepository for MemoryCommandRepository {
    async fn list_definitions(&self) -> Result<Vec<CommandDefinition>, Error> {
        Ok(self.definitions.lock().unwrap().clone())
    }

    async fn get_definition(&self, name: &str) -> Result<Option<CommandDefinition>, Error> {
        Ok(self.definitions.lock().unwrap().iter().find(|d| d.name.eq_ignore_ascii_case(name)).cloned())
    }
}

/// Records every private message it is asked to send.
#[derive(Default)]
pub struct TestPlatform {
    pub sent_pms: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatPlatform for TestPlatform {
    fn platform(&self) -> Platform {
        Platform::Twitch
    }

    async fn pm(&self, text: &str, user: &User) -> Result<(), Error> {
        self.sent_pms.lock().unwrap().push((user.name.clone(), text.to_string()));
        Ok(())
    }

    fn create_user_mention(&self, user: &User) -> String {
        format!("@{}", user.name)
    }

    async fn is_user_channel_owner(&self, _channel: &Channel, _user: &User) -> Result<bool, Error> {
        Ok(false)
    }
}

#[derive(Default)]
pub struct MemoryProperties {
    pub channel: Mutex<HashMap<(i64, String), Value>>,
    pub user: Mutex<HashMap<(i64, String), Value>>,
}

#[async_trait]
impl DataPropertyStore for MemoryProperties {
    async fn channel_property(&self, channel: &Channel, name: &str) -> Result<Option<Value>, Error> {
        Ok(self.channel.lock().unwrap().get(&(channel.channel_id, name.to_string())).cloned())
    }

    async fn user_property(&self, user: &User, name: &str) -> Result<Option<Value>, Error> {
        Ok(self.user.lock().unwrap().get(&(user.user_id, name.to_string())).cloned())
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    pub users: Mutex<Vec<User>>,
}

impl MemoryUsers {
    pub fn add(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn get_by_id(&self, user_id: i64) -> Result<Option<User>, Error> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<User>, Error> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.name.eq_ignore_ascii_case(name)).cloned())
    }
}

#[derive(Default)]
pub struct RecordingLogSink {
    pub executions: Mutex<Vec<CommandExecutionRecord>>,
    pub errors: Mutex<Vec<ErrorRecord>>,
    pub entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn log_command_execution(&self, record: CommandExecutionRecord) -> Result<(), Error> {
        self.executions.lock().unwrap().push(record);
        Ok(())
    }

    async fn log_error(&self, record: ErrorRecord) -> Result<(), Error> {
        self.errors.lock().unwrap().push(record);
        Ok(())
    }

    async fn log(&self, entry: LogEntry) -> Result<(), Error> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Counts how transactions it opened were finished.
#[derive(Default)]
pub struct CountingTransactions {
    pub begun: AtomicUsize,
    pub committed: Arc<AtomicUsize>,
    pub rolled_back: Arc<AtomicUsize>,
}

struct CountingTransaction {
    committed: Arc<AtomicUsize>,
    rolled_back: Arc<AtomicUsize>,
}

#[async_trait]
impl CommandTransaction for CountingTransaction {
    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait]
impl TransactionProvider for CountingTransactions {
    async fn begin(&self) -> Result<Box<dyn CommandTransaction>, Error> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingTransaction {
            committed: self.committed.clone(),
            rolled_back: self.rolled_back.clone(),
        }))
    }
}

/// What the fake moderation API answers with.
#[derive(Debug, Clone)]
pub enum ApiBehaviour {
    Allow,
    Ban(String),
    Timeout,
    Status(u16),
}

pub struct FakeModerationApi {
    pub behaviour: Mutex<ApiBehaviour>,
    pub calls: AtomicUsize,
}

impl FakeModerationApi {
    pub fn new(behaviour: ApiBehaviour) -> Self {
        Self { behaviour: Mutex::new(behaviour), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl ModerationApi for FakeModerationApi {
    async fn test_message(&self, _base_url: &str, _message: &str) -> Result<ModerationVerdict, ModerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.lock().unwrap().clone();
        match behaviour {
            ApiBehaviour::Allow => Ok(ModerationVerdict { banned: false, banphrase_data: None }),
            ApiBehaviour::Ban(phrase) => Ok(ModerationVerdict {
                banned: true,
                banphrase_data: Some(BanphraseData { phrase: Some(phrase) }),
            }),
            ApiBehaviour::Timeout => Err(ModerationError::Timeout),
            ApiBehaviour::Status(code) => Err(ModerationError::Status(code)),
        }
    }
}

/// A dispatcher wired to in-memory collaborators, with handles on all of them.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub filter_repo: Arc<MemoryFilterRepository>,
    pub properties: Arc<MemoryProperties>,
    pub users: Arc<MemoryUsers>,
    pub platform: Arc<TestPlatform>,
    pub log_sink: Arc<RecordingLogSink>,
    pub metrics: Arc<CounterMetrics>,
    pub transactions: Arc<CountingTransactions>,
    pub api: Arc<FakeModerationApi>,
}

impl Harness {
    pub async fn new(commands: Vec<(CommandDefinition, Arc<dyn CommandHandler>)>) -> Self {
        Self::with_api(commands, ApiBehaviour::Allow).await
    }

    pub async fn with_api(commands: Vec<(CommandDefinition, Arc<dyn CommandHandler>)>, behaviour: ApiBehaviour) -> Self {
        let config = BotConfig::default();
        let filter_repo = Arc::new(MemoryFilterRepository::new());
        let properties = Arc::new(MemoryProperties::default());
        let users = Arc::new(MemoryUsers::default());
        let log_sink = Arc::new(RecordingLogSink::default());
        let metrics = Arc::new(CounterMetrics::new());
        let transactions = Arc::new(CountingTransactions::default());
        let api = Arc::new(FakeModerationApi::new(behaviour));

        let mut table = HandlerTable::new();
        let mut definitions = Vec::new();
        for (definition, handler) in commands {
            table.register(&definition.name, handler);
            definitions.push(definition);
        }
        let registry = CommandRegistry::new(table);
        registry.install(definitions).await;

        let filters = FilterRegistry::new()
            .with_repository(filter_repo.clone())
            .with_collaborators(users.clone(), properties.clone());
        let banphrases = BanphraseEngine::new(api.clone(), PredicateTable::with_builtins(), config.banphrase.clone())
            .with_log_sink(log_sink.clone());

        let dispatcher = Dispatcher::new(
            config.dispatcher.clone(),
            Arc::new(registry),
            Arc::new(filters),
            Arc::new(CooldownManager::new(&config.cooldown)),
            Arc::new(banphrases),
            properties.clone(),
            log_sink.clone(),
            metrics.clone(),
        )
        .with_transactions(transactions.clone());

        Self {
            dispatcher,
            filter_repo,
            properties,
            users,
            platform: Arc::new(TestPlatform::default()),
            log_sink,
            metrics,
            transactions,
            api,
        }
    }

    pub fn invocation(&self, identifier: &str, args: &[&str], user: &User, channel: Option<&Channel>) -> Invocation {
        Invocation {
            identifier: identifier.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            user: user.clone(),
            channel: channel.cloned(),
            platform: self.platform.clone(),
            options: InvocationOptions::default(),
        }
    }
}

/// Pairs a definition with its handler, coercing the handler to a trait object.
pub fn entry(definition: CommandDefinition, handler: Arc<dyn CommandHandler>) -> (CommandDefinition, Arc<dyn CommandHandler>) {
    (definition, handler)
}

pub fn test_channel() -> Channel {
    Channel::new(10, "forsen", Platform::Twitch)
}
