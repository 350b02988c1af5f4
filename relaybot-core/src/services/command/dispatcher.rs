//! Runs a command invocation through every policy check, the handler itself,
//! and reply post-processing.
//!
//! Order matters in two places. Filters are evaluated before a parameter parse
//! failure is reported, so filtered users learn nothing about their input. The
//! cooldown check and the pending guard registration happen in one call to
//! [`CooldownManager::admit`], so concurrent invocations by the same user
//! cannot both be admitted.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use relaybot_common::models::{
    Channel, CommandDefinition, CommandExecutionRecord, CommandFlag, ErrorOrigin, ErrorRecord, Filter, User,
};
use relaybot_common::regex_literal::RegexOptions;
use relaybot_common::traits::chat_traits::{ChatPlatform, DataPropertyStore};
use relaybot_common::traits::sink_traits::{LogSink, MetricsSink};
use relaybot_common::traits::transaction_traits::{CommandTransaction, TransactionProvider};

use crate::config::DispatcherConfig;
use crate::services::banphrase::{BanphraseEngine, BanphraseOptions};
use crate::services::command::context::{
    Context, ContextAppend, CooldownOverride, Execution, ExternalRequestError,
};
use crate::services::command::params::{parse_parameters, Parameters, ParseOptions, ParseOutcome};
use crate::services::command::registry::CommandRegistry;
use crate::services::cooldown::{channel_key, Admission, CooldownManager};
use crate::services::filter::{FilterOptions, FilterOutcome, FilterRegistry, FilterScope};
use crate::services::metrics::{COMMAND_ERROR, COMMAND_FAIL, COMMAND_FILTERED, COMMAND_SUCCESS};
use crate::Error;

/// User data property marking bot administrators.
pub const ADMINISTRATOR_PROPERTY: &str = "administrator";

#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    /// Neither check nor register the pending guard.
    pub skip_pending: bool,
    /// Run even if the user is globally blacklisted.
    pub skip_global_ban: bool,
    pub skip_mention: bool,
    pub skip_banphrase_api: bool,
    /// The invocation is one stage of a pipe.
    pub piped: bool,
    pub alias_depth: u32,
    pub alias_stack: Vec<String>,
    pub tee: Vec<String>,
}

/// One attempt to run a command.
pub struct Invocation {
    pub identifier: String,
    pub args: Vec<String>,
    pub user: User,
    /// `None` for private messages.
    pub channel: Option<Channel>,
    pub platform: Arc<dyn ChatPlatform>,
    pub options: InvocationOptions,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub success: bool,
    /// Why the invocation failed or was refused, e.g. `cooldown` or `blacklist`.
    pub reason: Option<String>,
    pub reply: Option<String>,
    pub reply_with_private_message: bool,
    /// False if the reply was withheld or replaced by banphrases.
    pub passed: bool,
    /// The filter that refused the invocation.
    pub filter: Option<Arc<Filter>>,
    /// Set when the handler failed; the same id is in the error log.
    pub error_id: Option<Uuid>,
}

impl DispatchResult {
    fn refused(reason: impl Into<String>, reply: Option<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            reply,
            reply_with_private_message: false,
            passed: true,
            filter: None,
            error_id: None,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Whether a handler error was caused by something outside the bot.
pub fn classify_error(error: &anyhow::Error) -> ErrorOrigin {
    let external = error
        .chain()
        .any(|e| e.is::<ExternalRequestError>() || e.is::<reqwest::Error>());
    if external { ErrorOrigin::External } else { ErrorOrigin::Internal }
}

fn pending_description(invocation: &str, channel: Option<&Channel>) -> String {
    let place = channel.map_or_else(|| "private messages".to_string(), |c| format!("channel {}", c.name));
    format!(
        "You have a pending command: \"{}\" used in {} at {}",
        invocation,
        place,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

async fn finish_transaction(transaction: Option<Box<dyn CommandTransaction>>, commit: bool) {
    let Some(transaction) = transaction else {
        return;
    };
    let result = if commit { transaction.commit().await } else { transaction.rollback().await };
    match result {
        Ok(()) => debug!("Command transaction {}", if commit { "committed" } else { "rolled back" }),
        Err(e) => error!("Failed to end command transaction: {}", e),
    }
}

pub struct Dispatcher {
    config: DispatcherConfig,
    parse_options: ParseOptions,
    commands: Arc<CommandRegistry>,
    filters: Arc<FilterRegistry>,
    cooldowns: Arc<CooldownManager>,
    banphrases: Arc<BanphraseEngine>,
    properties: Arc<dyn DataPropertyStore>,
    log_sink: Arc<dyn LogSink>,
    metrics: Arc<dyn MetricsSink>,
    transactions: Option<Arc<dyn TransactionProvider>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatcherConfig,
        commands: Arc<CommandRegistry>,
        filters: Arc<FilterRegistry>,
        cooldowns: Arc<CooldownManager>,
        banphrases: Arc<BanphraseEngine>,
        properties: Arc<dyn DataPropertyStore>,
        log_sink: Arc<dyn LogSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let parse_options = ParseOptions {
            delimiter: config.parameter_delimiter.clone(),
            regex: RegexOptions {
                linear: config.regex_linear_mode,
                size_limit: config.regex_size_limit,
            },
        };
        Self {
            config,
            parse_options,
            commands,
            filters,
            cooldowns,
            banphrases,
            properties,
            log_sink,
            metrics,
            transactions: None,
        }
    }

    /// Required for commands flagged `rollback`.
    pub fn with_transactions(mut self, provider: Arc<dyn TransactionProvider>) -> Self {
        self.transactions = Some(provider);
        self
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    pub fn cooldowns(&self) -> &Arc<CooldownManager> {
        &self.cooldowns
    }

    pub fn banphrases(&self) -> &Arc<BanphraseEngine> {
        &self.banphrases
    }

    /// `$$alias` style identifiers: a privileged prefix glued to the next
    /// token is split off and that token becomes the first argument.
    fn split_privileged(&self, identifier: &str, args: &mut Vec<String>) -> String {
        let identifier = identifier.trim();
        for prefix in &self.config.privileged_prefixes {
            if identifier.len() > prefix.len() && identifier.starts_with(prefix.as_str()) {
                args.insert(0, identifier[prefix.len()..].to_string());
                return prefix.clone();
            }
        }
        identifier.to_string()
    }

    async fn is_admin(&self, user: &User) -> bool {
        match self.properties.user_property(user, ADMINISTRATOR_PROPERTY).await {
            Ok(value) => matches!(value, Some(Value::Bool(true))),
            Err(e) => {
                warn!("Could not read administrator flag of {}: {}", user.name, e);
                false
            }
        }
    }

    /// Logs a failure under a fresh id and returns the id with a reply that
    /// can be shown to the user.
    fn report_error(&self, error: &anyhow::Error, command: &str, context: Value) -> (Uuid, String) {
        let error_id = Uuid::new_v4();
        let origin = classify_error(error);
        let reply = match origin {
            ErrorOrigin::External => format!(
                "A third-party service this command depends on failed. Error ID: {}",
                error_id
            ),
            ErrorOrigin::Internal => format!("An unexpected error occurred! Error ID: {}", error_id),
        };

        error!("Command {} failed ({:?}, {}): {:?}", command, origin, error_id, error);
        self.metrics.increment(COMMAND_ERROR, command);

        let record = ErrorRecord {
            error_id,
            kind: "Command".to_string(),
            origin,
            message: format!("{:#}", error),
            context,
            created_at: Utc::now(),
        };
        let sink = self.log_sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.log_error(record).await {
                error!("Failed to write error log {}: {}", error_id, e);
            }
        });

        (error_id, reply)
    }

    fn spawn_execution_log(&self, record: CommandExecutionRecord) {
        let sink = self.log_sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.log_command_execution(record).await {
                error!("Failed to write command execution log: {}", e);
            }
        });
    }

    fn apply_cooldown(
        &self,
        cooldown: &CooldownOverride,
        command: &CommandDefinition,
        channel: Option<i64>,
        user: i64,
        scope: &FilterScope,
    ) {
        match cooldown {
            CooldownOverride::Disabled => {}
            CooldownOverride::Default => {
                if let Some(length) = command.cooldown {
                    let length = self.filters.modify_cooldown(scope, length);
                    self.cooldowns.set(channel, Some(user), Some(&command.name), length);
                }
            }
            CooldownOverride::Length(length) => {
                self.cooldowns.set(channel, Some(user), Some(&command.name), *length);
            }
            CooldownOverride::Custom(spec) => {
                let Some(length) = spec.length.or(command.cooldown) else {
                    return;
                };
                let length = if spec.ignore_cooldown_filters {
                    length
                } else {
                    self.filters.modify_cooldown(scope, length)
                };
                let target_command = spec.command.clone().unwrap_or_else(|| Some(command.name.clone()));
                self.cooldowns.set(
                    spec.channel.unwrap_or(channel),
                    spec.user.unwrap_or(Some(user)),
                    target_command.as_deref(),
                    length,
                );
            }
        }
    }

    /// Decides whether and how to run an invocation and produces the reply.
    pub async fn check_and_execute(&self, invocation: Invocation) -> DispatchResult {
        let Invocation { identifier, mut args, user, channel, platform, options } = invocation;

        let identifier = self.split_privileged(&identifier, &mut args);
        if identifier.is_empty() {
            return DispatchResult::refused("no-identifier", None);
        }

        if let Some(ch) = channel.as_ref() {
            if !ch.mode.accepts_commands() {
                return DispatchResult::refused(format!("channel-{}", ch.mode.reason_suffix()), None);
            }
        }

        let Some(registered) = self.commands.get(&identifier) else {
            return DispatchResult::refused("no-command", None);
        };
        let command = &registered.definition;
        let platform_kind = platform.platform();
        let channel_id = channel.as_ref().map(|c| c.channel_id);
        let cooldown_channel = Some(channel_key(channel_id));
        let is_admin = self.is_admin(&user).await;

        let pending = (!options.skip_pending && !is_admin).then(|| pending_description(&identifier, channel.as_ref()));
        match self.cooldowns.admit(channel_id, user.user_id, &command.name, options.skip_pending, pending) {
            Admission::Admitted => {}
            Admission::Cooldown => return DispatchResult::refused("cooldown", None),
            Admission::Pending(description) => {
                let reply = channel.is_none().then_some(description);
                return DispatchResult::refused("pending", reply);
            }
        }

        let mut params = Parameters::new();
        let mut parse_failure = None;
        if !command.params.is_empty() {
            match parse_parameters(&command.params, &args, &self.parse_options) {
                ParseOutcome::Success { parameters, args: rest } => {
                    params = parameters;
                    args = rest;
                }
                ParseOutcome::Failure { reply } => parse_failure = Some(reply),
            }
        }

        let scope = FilterScope {
            user: Some(user.user_id),
            channel: channel_id,
            command: Some(command.name.as_str()),
            invocation: Some(identifier.as_str()),
            platform: Some(platform_kind),
            skip_user_check: false,
        };
        let banphrase_options = BanphraseOptions {
            skip_banphrase_api: options.skip_banphrase_api,
            platform: Some(platform_kind),
        };
        let error_context = || {
            json!({
                "command": command.name,
                "invocation": identifier,
                "args": args,
                "user": user.name,
                "channel": channel.as_ref().map(|c| c.name.clone()),
                "platform": platform_kind.to_string(),
            })
        };

        let filter_options = FilterOptions {
            user: &user,
            channel: channel.as_ref(),
            platform: platform_kind,
            command,
            invocation: &identifier,
            args: &args,
            is_admin,
        };
        let outcome = match self.filters.execute(&filter_options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.cooldowns.unset_pending(user.user_id);
                let (error_id, reply) = self.report_error(&anyhow::Error::new(e), &command.name, error_context());
                return DispatchResult {
                    error_id: Some(error_id),
                    ..DispatchResult::refused("error", Some(reply))
                };
            }
        };

        if let FilterOutcome::Denied(denial) = outcome {
            if !(options.skip_global_ban && denial.is_global_ban()) {
                self.cooldowns.unset_pending(user.user_id);
                if let Some(length) = command.cooldown {
                    let length = self.filters.modify_cooldown(&scope, length);
                    self.cooldowns.set(cooldown_channel, Some(user.user_id), Some(&command.name), length);
                }

                let mut reply = denial.reply.clone();
                if denial.replies_with_reason() {
                    if let Some(text) = reply.take() {
                        reply = self.banphrases.execute(&text, channel.as_ref(), &banphrase_options).await.string;
                    }
                }

                self.metrics.increment(COMMAND_FILTERED, &command.name);
                debug!("Command {} by {} filtered: {}", command.name, user.name, denial.reason);
                return DispatchResult {
                    filter: denial.filter,
                    ..DispatchResult::refused(denial.reason, reply)
                };
            }
        }

        if let Some(reply) = parse_failure {
            self.cooldowns.unset_pending(user.user_id);
            return DispatchResult::refused("parameter", Some(reply));
        }

        let transaction = if command.has_flag(CommandFlag::Rollback) {
            let begun = match self.transactions.as_ref() {
                Some(provider) => provider.begin().await,
                None => Err(Error::Config(format!("Command {} needs a transaction provider", command.name))),
            };
            match begun {
                Ok(transaction) => Some(transaction),
                Err(e) => {
                    self.cooldowns.unset_pending(user.user_id);
                    let (error_id, reply) = self.report_error(&anyhow::Error::new(e), &command.name, error_context());
                    return DispatchResult {
                        error_id: Some(error_id),
                        ..DispatchResult::refused("error", Some(reply))
                    };
                }
            }
        } else {
            None
        };

        let mut ctx = Context {
            command: command.clone(),
            invocation: identifier.clone(),
            user: user.clone(),
            channel: channel.clone(),
            platform: platform.clone(),
            transaction,
            params,
            append: ContextAppend {
                pipe: options.piped,
                tee: options.tee.clone(),
                alias_depth: options.alias_depth,
                alias_stack: options.alias_stack.clone(),
                private_message: channel.is_none(),
                skip_banphrase_api: options.skip_banphrase_api,
            },
        };

        let started = Instant::now();
        let result = AssertUnwindSafe(registered.handler.execute(&mut ctx, &args))
            .catch_unwind()
            .await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut transaction = ctx.transaction.take();

        let mut reason = None;
        let mut error_id = None;
        let execution = match result {
            Ok(Ok(execution)) => {
                self.spawn_execution_log(CommandExecutionRecord {
                    execution_id: Uuid::new_v4(),
                    user_id: user.user_id,
                    command: command.name.clone(),
                    platform: platform_kind,
                    channel_id,
                    executed_at: Utc::now(),
                    success: execution.is_success(),
                    invocation: identifier.clone(),
                    arguments: args.clone(),
                    result: execution.reply.as_deref().map(|r| truncate(r, self.config.log_result_length)),
                    execution_time_ms: elapsed_ms,
                });
                let metric = if execution.is_success() { COMMAND_SUCCESS } else { COMMAND_FAIL };
                self.metrics.increment(metric, &command.name);
                execution
            }
            Ok(Err(e)) => {
                let (id, reply) = self.report_error(&e, &command.name, error_context());
                reason = Some("error".to_string());
                error_id = Some(id);
                Execution::failure(reply)
            }
            Err(panic) => {
                let e = anyhow::anyhow!("Command handler panicked: {}", panic_message(&*panic));
                let (id, reply) = self.report_error(&e, &command.name, error_context());
                reason = Some("error".to_string());
                error_id = Some(id);
                Execution::failure(reply)
            }
        };

        // a failed handler's writes are never kept
        if error_id.is_some() {
            finish_transaction(transaction.take(), false).await;
        }

        self.cooldowns.unset_pending(user.user_id);

        let success = execution.is_success();
        let base = DispatchResult {
            success,
            reason,
            reply: None,
            reply_with_private_message: false,
            passed: true,
            filter: None,
            error_id,
        };

        if command.has_flag(CommandFlag::ReadOnly) {
            finish_transaction(transaction, success).await;
            return base;
        }

        self.apply_cooldown(&execution.cooldown, command, cooldown_channel, user.user_id, &scope);

        let reply = match (execution.reply.clone(), execution.partial_replies.as_ref()) {
            (Some(reply), _) => reply,
            (None, Some(parts)) => {
                let mut pieces = Vec::with_capacity(parts.len());
                for part in parts {
                    if part.bancheck {
                        let checked = self.banphrases.execute(&part.message, channel.as_ref(), &banphrase_options).await;
                        pieces.push(checked.string.unwrap_or_default());
                    } else {
                        pieces.push(part.message.clone());
                    }
                }
                pieces.join(" ")
            }
            (None, None) => {
                finish_transaction(transaction, true).await;
                return base;
            }
        };

        let skip_banphrase = command.has_flag(CommandFlag::SkipBanphrase) || execution.meta.skip_banphrase;
        let (reply, passed, suggested_private) = if skip_banphrase {
            (Some(reply), true, false)
        } else {
            let checked = self.banphrases.execute(&reply, channel.as_ref(), &banphrase_options).await;
            (checked.string, checked.passed, checked.private_message)
        };
        finish_transaction(transaction, passed).await;

        let reply_with_private_message = execution.reply_with_private_message.unwrap_or(suggested_private);
        let Some(mut reply) = reply else {
            return DispatchResult { passed, reply_with_private_message, ..base };
        };

        match self.filters.apply_unping(&reply, &scope).await {
            Ok(unpinged) => reply = unpinged,
            Err(e) => warn!("Unping failed for command {}: {}", command.name, e),
        }

        let wants_mention = command.has_flag(CommandFlag::Mention)
            && !options.skip_mention
            && !reply_with_private_message
            && channel.as_ref().is_some_and(|c| c.mention)
            && self.filters.get_mention_status(&scope);
        if wants_mention {
            let mention = platform.create_user_mention(&user);
            let checked = self.banphrases.execute(&mention, channel.as_ref(), &banphrase_options).await;
            let mention = match (checked.passed, checked.string) {
                (true, Some(m)) => m,
                _ => self.config.banphrased_mention.clone(),
            };
            reply = format!("{}, {}", mention, reply);
        }

        let via_alias_or_pipe = options.piped || options.alias_depth > 0;
        let prefix = if execution.is_channel_alias {
            Some(&self.config.channel_alias_prefix)
        } else if execution.force_external_prefix
            || ((execution.has_external_input || command.has_flag(CommandFlag::ExternalInput))
                && via_alias_or_pipe
                && !execution.skip_external_prefix)
        {
            Some(&self.config.external_input_prefix)
        } else {
            None
        };
        if let Some(prefix) = prefix {
            reply = format!("{} {}", prefix, reply);
        }

        DispatchResult {
            reply: Some(reply),
            passed,
            reply_with_private_message,
            ..base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("héllo wörld", 5), "héllo…");
    }

    #[test]
    fn test_error_classification() {
        let external = anyhow::Error::new(ExternalRequestError::new("weather", "503"));
        assert_eq!(classify_error(&external), ErrorOrigin::External);

        let wrapped = external.context("while fetching forecast");
        assert_eq!(classify_error(&wrapped), ErrorOrigin::External);

        let internal = anyhow::anyhow!("index out of range");
        assert_eq!(classify_error(&internal), ErrorOrigin::Internal);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
    }
}
