use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use relaybot_common::traits::sink_traits::LogSink;
use relaybot_common::traits::chat_traits::ChatPlatform;
use relaybot_core::config::BotConfig;
use relaybot_core::repositories::{
    PgTransactionProvider, PostgresBanphraseRepository, PostgresCommandRepository, PostgresFilterRepository,
    PostgresLogSink,
};
use relaybot_core::services::banphrase::predicates::PredicateTable;
use relaybot_core::services::builtin_commands::{builtin_definitions, register_builtins};
use relaybot_core::services::command::dispatcher::ADMINISTRATOR_PROPERTY;
use relaybot_core::services::command::{Dispatcher, HandlerTable, Invocation, InvocationOptions};
use relaybot_core::services::log_sink::TracingLogSink;
use relaybot_core::services::metrics::CounterMetrics;
use relaybot_core::services::{BanphraseEngine, CommandRegistry, CooldownManager, FilterRegistry};
use relaybot_core::tasks::cooldown_prune::spawn_cooldown_prune_task;
use relaybot_core::{Database, Error, PajbotModerationClient};

mod console;
use console::{split_command_line, ConsolePlatform, MemoryPropertyStore, MemoryUserDirectory};

#[derive(Parser, Debug, Clone)]
#[command(name = "relaybot")]
#[command(author, version, about = "Relaybot - chat command dispatcher with filters, cooldowns and banphrases")]
struct Args {
    /// Postgres connection URL. Without one the bot runs on built-in commands only.
    #[arg(long, env = "DATABASE_URL")]
    db_url: Option<String>,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name the console user chats as.
    #[arg(long, default_value = "console")]
    console_user: String,

    /// Treat the console user as a bot administrator.
    #[arg(long, default_value = "false")]
    admin: bool,

    #[arg(long, default_value = "false")]
    skip_migrations: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("relaybot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("Relaybot starting. console_user={}, database={}", args.console_user, args.db_url.is_some());

    if let Err(e) = run(args).await {
        error!("Relaybot error: {:?}", e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn run(args: Args) -> Result<(), Error> {
    let config = match args.config.as_ref() {
        Some(path) => BotConfig::load(path)?,
        None => BotConfig::default(),
    };

    let users = Arc::new(MemoryUserDirectory::new());
    let properties = Arc::new(MemoryPropertyStore::new());
    let metrics = Arc::new(CounterMetrics::new());

    let mut handlers = HandlerTable::new();
    register_builtins(&mut handlers);

    let api = Arc::new(PajbotModerationClient::new(Duration::from_millis(config.banphrase.api_timeout_ms)));
    let mut commands = CommandRegistry::new(handlers);
    let mut filters = FilterRegistry::new().with_collaborators(users.clone(), properties.clone());
    let mut banphrases = BanphraseEngine::new(api, PredicateTable::with_builtins(), config.banphrase.clone());

    let database = match args.db_url.as_deref() {
        Some(url) => {
            let db = Database::new(url).await?;
            if !args.skip_migrations {
                db.migrate().await?;
            }
            Some(db)
        }
        None => {
            warn!("No database configured; filters and banphrases start empty.");
            None
        }
    };

    let log_sink: Arc<dyn LogSink> = match database.as_ref() {
        Some(db) => Arc::new(PostgresLogSink::new(db.pool().clone())),
        None => Arc::new(TracingLogSink),
    };

    if let Some(db) = database.as_ref() {
        commands = commands.with_repository(Arc::new(PostgresCommandRepository::new(db.pool().clone())));
        filters = filters.with_repository(Arc::new(PostgresFilterRepository::new(db.pool().clone())));
        banphrases = banphrases
            .with_repository(Arc::new(PostgresBanphraseRepository::new(db.pool().clone())))
            .with_log_sink(log_sink.clone());
    }

    let commands = Arc::new(commands);
    let filters = Arc::new(filters);
    let banphrases = Arc::new(banphrases);
    let cooldowns = Arc::new(CooldownManager::new(&config.cooldown));

    if database.is_some() {
        let loaded = commands.reload_all().await?;
        if loaded == 0 {
            info!("Command catalog is empty; installing built-in commands.");
            commands.install(builtin_definitions()).await;
        }
        filters.load_all().await?;
        banphrases.load_all().await?;
    } else {
        commands.install(builtin_definitions()).await;
    }
    info!(
        "Ready: {} commands, {} filters, {} banphrases",
        commands.len(),
        filters.len(),
        banphrases.len()
    );

    let prefixes = config.dispatcher.privileged_prefixes.clone();
    let mut dispatcher = Dispatcher::new(
        config.dispatcher.clone(),
        commands,
        filters,
        cooldowns.clone(),
        banphrases,
        properties.clone(),
        log_sink,
        metrics,
    );
    if let Some(db) = database.as_ref() {
        dispatcher = dispatcher.with_transactions(Arc::new(PgTransactionProvider::new(db.pool().clone())));
    }

    let _prune_handle = spawn_cooldown_prune_task(
        cooldowns,
        Duration::from_secs(config.cooldown.prune_interval_secs),
    );

    let platform = Arc::new(ConsolePlatform::new(&args.console_user));
    let user = users.get_or_create(&args.console_user);
    if args.admin {
        properties.set_user_property(user.user_id, ADMINISTRATOR_PROPERTY, Value::Bool(true));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Console input closed.");
                    break;
                };
                let Some((identifier, args)) = split_command_line(&line, &prefixes) else {
                    continue;
                };
                let invocation = Invocation {
                    identifier,
                    args,
                    user: user.clone(),
                    channel: Some(platform.channel()),
                    platform: platform.clone(),
                    options: InvocationOptions::default(),
                };
                let result = dispatcher.check_and_execute(invocation).await;
                if let Some(reply) = result.reply {
                    if result.reply_with_private_message {
                        platform.pm(&reply, &user).await?;
                    } else {
                        println!("{}", reply);
                    }
                } else if let Some(reason) = result.reason {
                    info!("No reply ({})", reason);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C detected; shutting down.");
                break;
            }
        }
    }

    Ok(())
}
