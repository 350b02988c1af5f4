//! Outgoing message moderation.
//!
//! Local rules run first, in descending priority. `Replacement` rules rewrite
//! the message and let the remaining rules see the rewritten text; any other
//! rule type that matches ends evaluation with a denial. Messages that survive
//! the local rules go to the channel's external moderation API, if it has one.

pub mod predicates;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, error, info, warn};

use relaybot_common::models::{
    BanphraseCodeSpec, BanphraseId, BanphraseRecord, BanphraseType, Channel, DowntimePolicy, LogEntry, Platform,
};
use relaybot_common::regex_literal::{self, RegexOptions};
use relaybot_common::traits::repository_traits::BanphraseRepository;
use relaybot_common::traits::sink_traits::LogSink;
use crate::config::BanphraseConfig;
use crate::http::{ModerationApi, ModerationError};
use crate::Error;

pub use predicates::{BanphrasePredicate, CodeOutcome, PredicateTable};

/// Executable body of a banphrase rule.
#[derive(Clone)]
pub enum BanphraseCode {
    Pattern { regex: Regex, output: Option<String> },
    Registered { name: String, predicate: Arc<dyn BanphrasePredicate> },
}

impl std::fmt::Debug for BanphraseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BanphraseCode::Pattern { regex, output } => f
                .debug_struct("Pattern")
                .field("regex", &regex.as_str())
                .field("output", output)
                .finish(),
            BanphraseCode::Registered { name, .. } => f.debug_struct("Registered").field("name", name).finish(),
        }
    }
}

impl BanphraseCode {
    pub fn compile(spec: &BanphraseCodeSpec, predicates: &PredicateTable) -> Result<Self, Error> {
        match spec {
            BanphraseCodeSpec::Pattern { pattern, output } => Ok(BanphraseCode::Pattern {
                regex: regex_literal::compile(pattern, &RegexOptions::default())?,
                output: output.clone(),
            }),
            BanphraseCodeSpec::Phrase { phrase, output } => Ok(BanphraseCode::Pattern {
                regex: regex_literal::compile_with_flags(&regex::escape(phrase), "i", &RegexOptions::default())?,
                output: output.clone(),
            }),
            BanphraseCodeSpec::Registered { name } => {
                let predicate = predicates
                    .get(name)
                    .ok_or_else(|| Error::NotFound(format!("No registered banphrase predicate '{}'", name)))?;
                Ok(BanphraseCode::Registered { name: name.clone(), predicate })
            }
        }
    }

    /// Runs the body. Replacement patterns substitute `output` into every match.
    pub fn evaluate(&self, message: &str, replacement: bool) -> CodeOutcome {
        match self {
            BanphraseCode::Pattern { regex, output } => {
                if !regex.is_match(message) {
                    return CodeOutcome::Pass;
                }
                if replacement {
                    let template = output.as_deref().unwrap_or("");
                    CodeOutcome::Hit(Some(regex.replace_all(message, template).into_owned()))
                } else {
                    CodeOutcome::Hit(output.clone())
                }
            }
            BanphraseCode::Registered { predicate, .. } => predicate.evaluate(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Banphrase {
    pub id: BanphraseId,
    pub code: BanphraseCode,
    pub banphrase_type: BanphraseType,
    pub platform: Option<Platform>,
    pub channel: Option<i64>,
    pub active: bool,
    pub priority: i32,
    pub description: Option<String>,
}

impl Banphrase {
    pub fn from_record(record: BanphraseRecord, predicates: &PredicateTable) -> Result<Self, Error> {
        let spec: BanphraseCodeSpec = serde_json::from_value(record.code)?;
        Ok(Self {
            id: BanphraseId::Persisted(record.banphrase_id),
            code: BanphraseCode::compile(&spec, predicates)?,
            banphrase_type: record.banphrase_type.parse()?,
            platform: record.platform.as_deref().map(str::parse::<Platform>).transpose()?,
            channel: record.channel_id,
            active: record.active,
            priority: record.priority,
            description: record.description,
        })
    }

    /// Whether this rule applies to messages in `channel` (or, without a
    /// channel, to private messages on `platform`).
    fn applies_to(&self, channel: Option<&Channel>, platform: Option<Platform>) -> bool {
        match (self.channel, self.platform) {
            (None, None) => true,
            (Some(id), _) => channel.is_some_and(|c| c.channel_id == id),
            (None, Some(p)) => channel.map(|c| c.platform).or(platform) == Some(p),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BanphraseOptions {
    /// Do not consult the external moderation API.
    pub skip_banphrase_api: bool,
    /// Platform of a private message; channel messages use the channel's.
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanphraseResult {
    /// Text to send, if anything should be sent at all.
    pub string: Option<String>,
    pub passed: bool,
    /// The moderation API was unavailable and a downtime policy was applied.
    pub warn: bool,
    /// The message should go to the invoking user privately.
    pub private_message: bool,
}

impl BanphraseResult {
    fn passed(string: String) -> Self {
        Self { string: Some(string), passed: true, warn: false, private_message: false }
    }

    fn denied(string: Option<String>) -> Self {
        Self { string, passed: false, warn: false, private_message: false }
    }
}

pub struct BanphraseEngine {
    rules: RwLock<Arc<Vec<Arc<Banphrase>>>>,
    repo: Option<Arc<dyn BanphraseRepository>>,
    api: Arc<dyn ModerationApi>,
    predicates: PredicateTable,
    log_sink: Option<Arc<dyn LogSink>>,
    config: BanphraseConfig,
    next_ephemeral: AtomicU64,
}

impl BanphraseEngine {
    pub fn new(
        api: Arc<dyn ModerationApi>,
        predicates: PredicateTable,
        config: BanphraseConfig,
    ) -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            repo: None,
            api,
            predicates,
            log_sink: None,
            config,
            next_ephemeral: AtomicU64::new(1),
        }
    }

    pub fn with_repository(mut self, repo: Arc<dyn BanphraseRepository>) -> Self {
        self.repo = Some(repo);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    fn repo(&self) -> Result<&Arc<dyn BanphraseRepository>, Error> {
        self.repo
            .as_ref()
            .ok_or_else(|| Error::Config("Banphrase engine has no repository".into()))
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Banphrase>>> {
        self.rules.read().clone()
    }

    /// Replaces the rule set. Inactive rules are dropped, the rest sorted by
    /// descending priority.
    fn install(&self, mut rules: Vec<Arc<Banphrase>>) {
        rules.retain(|b| b.active && b.banphrase_type != BanphraseType::Inactive);
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        *self.rules.write() = Arc::new(rules);
    }

    fn compile_records(&self, records: Vec<BanphraseRecord>) -> Vec<Arc<Banphrase>> {
        records
            .into_iter()
            .filter_map(|record| {
                let id = record.banphrase_id;
                match Banphrase::from_record(record, &self.predicates) {
                    Ok(b) => Some(Arc::new(b)),
                    Err(e) => {
                        error!("Banphrase {} could not be compiled: {}", id, e);
                        None
                    }
                }
            })
            .collect()
    }

    pub async fn load_all(&self) -> Result<usize, Error> {
        let records = self.repo()?.list_active().await?;
        let compiled = self.compile_records(records);

        // ephemeral rules survive a reload
        let mut rules: Vec<Arc<Banphrase>> = self
            .snapshot()
            .iter()
            .filter(|b| matches!(b.id, BanphraseId::Ephemeral(_)))
            .cloned()
            .collect();
        rules.extend(compiled);

        self.install(rules);
        let count = self.len();
        info!("Loaded {} banphrases", count);
        Ok(count)
    }

    pub async fn reload_all(&self) -> Result<usize, Error> {
        self.load_all().await
    }

    /// Re-reads the given rules. Rows that vanished or became inactive are
    /// removed from the engine.
    pub async fn reload_specific(&self, ids: &[i64]) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }
        let records = self.repo()?.get_by_ids(ids).await?;
        let fresh = self.compile_records(records);

        let wanted: HashSet<BanphraseId> = ids.iter().map(|id| BanphraseId::Persisted(*id)).collect();
        let mut rules: Vec<Arc<Banphrase>> = self
            .snapshot()
            .iter()
            .filter(|b| !wanted.contains(&b.id))
            .cloned()
            .collect();
        rules.extend(fresh);
        self.install(rules);
        debug!("Reloaded banphrases {:?}", ids);
        Ok(())
    }

    /// Adds a rule that lives only in memory.
    pub fn create_ephemeral(
        &self,
        spec: &BanphraseCodeSpec,
        banphrase_type: BanphraseType,
        channel: Option<i64>,
        platform: Option<Platform>,
        priority: i32,
    ) -> Result<BanphraseId, Error> {
        let id = BanphraseId::Ephemeral(self.next_ephemeral.fetch_add(1, Ordering::Relaxed));
        let banphrase = Banphrase {
            id,
            code: BanphraseCode::compile(spec, &self.predicates)?,
            banphrase_type,
            platform,
            channel,
            active: true,
            priority,
            description: None,
        };

        let mut rules = self.snapshot().as_ref().clone();
        rules.push(Arc::new(banphrase));
        self.install(rules);
        Ok(id)
    }

    pub fn get(&self, id: BanphraseId) -> Option<Arc<Banphrase>> {
        self.snapshot().iter().find(|b| b.id == id).cloned()
    }

    /// Flips a persisted rule's active state and reloads it. Returns the new state.
    pub async fn toggle(&self, id: i64) -> Result<bool, Error> {
        let repo = self.repo()?;
        let record = repo
            .get_by_ids(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("Banphrase {} does not exist", id)))?;

        let active = !record.active;
        repo.set_active(id, active).await?;
        self.reload_specific(&[id]).await?;
        info!("Banphrase {} is now {}", id, if active { "active" } else { "inactive" });
        Ok(active)
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Checks `message` for sending in `channel` (`None` for private messages).
    pub async fn execute(&self, message: &str, channel: Option<&Channel>, options: &BanphraseOptions) -> BanphraseResult {
        let rules = self.snapshot();
        let mut message = message.to_string();

        for rule in rules.iter() {
            if rule.banphrase_type == BanphraseType::ApiResponse || !rule.applies_to(channel, options.platform) {
                continue;
            }

            let replacement = rule.banphrase_type == BanphraseType::Replacement;
            match rule.code.evaluate(&message, replacement) {
                CodeOutcome::Pass => continue,
                CodeOutcome::Hit(result) if replacement => {
                    if let Some(rewritten) = result {
                        message = rewritten;
                    }
                }
                CodeOutcome::Hit(result) => {
                    debug!("Banphrase {} ({}) denied a message", rule.id, rule.banphrase_type);
                    let string = match rule.banphrase_type {
                        BanphraseType::CustomResponse => result,
                        _ => None,
                    };
                    return BanphraseResult::denied(string);
                }
            }
        }

        let Some(channel) = channel else {
            return BanphraseResult::passed(message);
        };
        let Some(url) = channel.banphrase_api_url.as_deref() else {
            return BanphraseResult::passed(message);
        };
        if options.skip_banphrase_api {
            return BanphraseResult::passed(message);
        }

        let checked: String = message.chars().take(self.config.api_message_limit).collect();
        match self.api.test_message(url, &checked).await {
            Ok(verdict) if verdict.banned => {
                let phrase = verdict.phrase().unwrap_or_default().to_string();
                self.spawn_log(LogEntry::new(
                    "Banphrase API",
                    format!("Message \"{}\" was banned by {} (phrase: {})", checked, url, phrase),
                    Some(channel.channel_id),
                    None,
                ));

                let subject = if phrase.is_empty() { checked.as_str() } else { phrase.as_str() };
                let reply = self
                    .api_response(&rules, channel, subject)
                    .unwrap_or_else(|| self.config.default_api_response.clone());
                BanphraseResult::denied(Some(reply))
            }
            Ok(_) => BanphraseResult::passed(message),
            Err(e) => {
                warn!("Banphrase API {} for channel {} failed: {}", url, channel.name, e);
                self.apply_downtime_policy(message, channel, &e)
            }
        }
    }

    fn api_response(&self, rules: &[Arc<Banphrase>], channel: &Channel, subject: &str) -> Option<String> {
        rules
            .iter()
            .filter(|b| b.banphrase_type == BanphraseType::ApiResponse)
            .filter(|b| b.channel.is_none_or(|id| id == channel.channel_id))
            .find_map(|b| match b.code.evaluate(subject, false) {
                CodeOutcome::Hit(Some(reply)) => Some(reply),
                _ => None,
            })
    }

    fn apply_downtime_policy(&self, message: String, channel: &Channel, error: &ModerationError) -> BanphraseResult {
        let policy = channel.banphrase_api_downtime.unwrap_or_default();
        let degraded = |string: Option<String>, passed: bool, private_message: bool| BanphraseResult {
            string,
            passed,
            warn: true,
            private_message,
        };

        match policy {
            DowntimePolicy::Ignore => degraded(Some(message), true, false),
            DowntimePolicy::Notify => degraded(Some(format!("{} {}", self.config.downtime_warning, message)), true, false),
            DowntimePolicy::Nothing => degraded(None, false, false),
            DowntimePolicy::Refuse => {
                let reason = match error {
                    ModerationError::Timeout => "Cannot reply - banphrase API timed out.".to_string(),
                    ModerationError::Status(code) => {
                        format!("Cannot reply - banphrase API returned status {}.", code)
                    }
                    ModerationError::Other(_) => "Cannot reply - banphrase API is currently down.".to_string(),
                };
                degraded(Some(reason), false, false)
            }
            DowntimePolicy::Whisper => degraded(Some(message), true, true),
        }
    }

    fn spawn_log(&self, entry: LogEntry) {
        let Some(sink) = self.log_sink.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = sink.log(entry).await {
                error!("Failed to write banphrase log entry: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockModerationApi, ModerationVerdict, BanphraseData};
    use relaybot_common::models::Platform;
    use serde_json::json;

    fn engine(api: MockModerationApi) -> BanphraseEngine {
        BanphraseEngine::new(Arc::new(api), PredicateTable::with_builtins(), BanphraseConfig::default())
    }

    fn no_api() -> MockModerationApi {
        let mut api = MockModerationApi::new();
        api.expect_test_message().never();
        api
    }

    fn pattern(p: &str, output: Option<&str>) -> BanphraseCodeSpec {
        BanphraseCodeSpec::Pattern { pattern: p.into(), output: output.map(str::to_string) }
    }

    fn channel_with_api(policy: Option<DowntimePolicy>) -> Channel {
        let mut ch = Channel::new(7, "forsen", Platform::Twitch);
        ch.banphrase_api_url = Some("https://api.example".into());
        ch.banphrase_api_downtime = policy;
        ch
    }

    #[tokio::test]
    async fn test_replacement_re_enters_the_chain() {
        let engine = engine(no_api());
        engine.create_ephemeral(&pattern("bad", Some("good")), BanphraseType::Replacement, None, None, 10).unwrap();
        engine.create_ephemeral(&pattern("good", None), BanphraseType::Denial, None, None, 5).unwrap();

        let result = engine.execute("bad", None, &BanphraseOptions::default()).await;
        assert!(!result.passed);
        assert_eq!(result.string, None);
    }

    #[tokio::test]
    async fn test_priority_order_decides_which_rule_sees_the_text() {
        let engine = engine(no_api());
        // runs after the replacement below, so never sees "bad"
        engine.create_ephemeral(&pattern("bad", None), BanphraseType::Denial, None, None, 1).unwrap();
        engine.create_ephemeral(&pattern("(?i)bad", Some("b*d")), BanphraseType::Replacement, None, None, 9).unwrap();

        let result = engine.execute("so BAD", None, &BanphraseOptions::default()).await;
        assert!(result.passed);
        assert_eq!(result.string.as_deref(), Some("so b*d"));
    }

    #[tokio::test]
    async fn test_custom_response_and_scoping() {
        let engine = engine(no_api());
        let spec = BanphraseCodeSpec::Phrase { phrase: "secret".into(), output: Some("Nope.".into()) };
        engine.create_ephemeral(&spec, BanphraseType::CustomResponse, Some(7), None, 1).unwrap();

        let here = Channel::new(7, "here", Platform::Twitch);
        let there = Channel::new(8, "there", Platform::Twitch);
        let opts = BanphraseOptions::default();

        let denied = engine.execute("a SECRET thing", Some(&here), &opts).await;
        assert_eq!(denied, BanphraseResult::denied(Some("Nope.".into())));

        let passed = engine.execute("a SECRET thing", Some(&there), &opts).await;
        assert!(passed.passed);
    }

    #[tokio::test]
    async fn test_platform_scoped_rule_for_private_messages() {
        let engine = engine(no_api());
        engine
            .create_ephemeral(&pattern("x", None), BanphraseType::Denial, None, Some(Platform::Discord), 1)
            .unwrap();

        let twitch = BanphraseOptions { platform: Some(Platform::Twitch), ..Default::default() };
        let discord = BanphraseOptions { platform: Some(Platform::Discord), ..Default::default() };
        assert!(engine.execute("x", None, &twitch).await.passed);
        assert!(!engine.execute("x", None, &discord).await.passed);
    }

    #[tokio::test]
    async fn test_api_ban_uses_api_response_rule() {
        let mut api = MockModerationApi::new();
        api.expect_test_message().times(1).returning(|_, _| {
            Ok(ModerationVerdict {
                banned: true,
                banphrase_data: Some(BanphraseData { phrase: Some("forsen".into()) }),
            })
        });
        let engine = engine(api);
        let spec = BanphraseCodeSpec::Phrase { phrase: "forsen".into(), output: Some("Custom API denial".into()) };
        engine.create_ephemeral(&spec, BanphraseType::ApiResponse, None, None, 1).unwrap();

        let ch = channel_with_api(None);
        let result = engine.execute("hi forsen", Some(&ch), &BanphraseOptions::default()).await;
        assert_eq!(result, BanphraseResult::denied(Some("Custom API denial".into())));
    }

    #[tokio::test]
    async fn test_api_ban_falls_back_to_default_response() {
        let mut api = MockModerationApi::new();
        api.expect_test_message()
            .returning(|_, _| Ok(ModerationVerdict { banned: true, banphrase_data: None }));
        let engine = engine(api);

        let ch = channel_with_api(None);
        let result = engine.execute("hi", Some(&ch), &BanphraseOptions::default()).await;
        assert!(!result.passed);
        assert_eq!(result.string, Some(BanphraseConfig::default().default_api_response));
    }

    #[tokio::test]
    async fn test_api_receives_truncated_message() {
        let mut api = MockModerationApi::new();
        api.expect_test_message()
            .withf(|url, message| url == "https://api.example" && message.chars().count() == 1000)
            .returning(|_, _| Ok(ModerationVerdict { banned: false, banphrase_data: None }));
        let engine = engine(api);

        let long = "a".repeat(1500);
        let ch = channel_with_api(None);
        let result = engine.execute(&long, Some(&ch), &BanphraseOptions::default()).await;
        assert_eq!(result.string.map(|s| s.len()), Some(1500));
    }

    #[tokio::test]
    async fn test_skip_api_option() {
        let engine = engine(no_api());
        let ch = channel_with_api(None);
        let opts = BanphraseOptions { skip_banphrase_api: true, ..Default::default() };
        assert!(engine.execute("hi", Some(&ch), &opts).await.passed);
    }

    async fn run_with_failure(policy: DowntimePolicy, error: ModerationError) -> BanphraseResult {
        let mut api = MockModerationApi::new();
        api.expect_test_message().returning(move |_, _| Err(error.clone()));
        let engine = engine(api);
        let ch = channel_with_api(Some(policy));
        engine.execute("hello", Some(&ch), &BanphraseOptions::default()).await
    }

    #[tokio::test]
    async fn test_downtime_policies() {
        let r = run_with_failure(DowntimePolicy::Ignore, ModerationError::Timeout).await;
        assert_eq!((r.string.as_deref(), r.passed, r.warn), (Some("hello"), true, true));

        let r = run_with_failure(DowntimePolicy::Notify, ModerationError::Timeout).await;
        assert_eq!(r.string.as_deref(), Some("⚠ hello"));
        assert!(r.passed && r.warn);

        let r = run_with_failure(DowntimePolicy::Nothing, ModerationError::Timeout).await;
        assert_eq!((r.string, r.passed), (None, false));

        let r = run_with_failure(DowntimePolicy::Whisper, ModerationError::Timeout).await;
        assert!(r.passed && r.private_message);
    }

    #[tokio::test]
    async fn test_refuse_policy_reasons() {
        let r = run_with_failure(DowntimePolicy::Refuse, ModerationError::Timeout).await;
        assert_eq!(r.string.as_deref(), Some("Cannot reply - banphrase API timed out."));
        assert!(!r.passed);

        let r = run_with_failure(DowntimePolicy::Refuse, ModerationError::Status(502)).await;
        assert_eq!(r.string.as_deref(), Some("Cannot reply - banphrase API returned status 502."));

        let r = run_with_failure(DowntimePolicy::Refuse, ModerationError::Other("dns".into())).await;
        assert_eq!(r.string.as_deref(), Some("Cannot reply - banphrase API is currently down."));
    }

    #[test]
    fn test_record_compilation() {
        let record = BanphraseRecord {
            banphrase_id: 3,
            code: json!({ "kind": "registered", "name": "links" }),
            banphrase_type: "Denial".into(),
            platform: Some("twitch".into()),
            channel_id: None,
            active: true,
            priority: 4,
            description: None,
        };
        let b = Banphrase::from_record(record.clone(), &PredicateTable::with_builtins()).unwrap();
        assert_eq!(b.id, BanphraseId::Persisted(3));
        assert_eq!(b.platform, Some(Platform::Twitch));

        let unknown = BanphraseRecord { code: json!({ "kind": "registered", "name": "nope" }), ..record };
        assert!(matches!(
            Banphrase::from_record(unknown, &PredicateTable::with_builtins()),
            Err(Error::NotFound(_))
        ));
    }
}
