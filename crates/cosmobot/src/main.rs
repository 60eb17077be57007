use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::time::sleep;

use cosmobot::cli::{Cli, Commands};
use cosmobot::telegram::{create_bot, setup_bot_commands, TelegramGiftSender};
use cosmobot::telegram::{run_webapp_server, Bot};
use cosmobot::{schema, HandlerDeps};
use cosmocore::config;
use cosmocore::db::create_pool;
use cosmocore::gifts::GiftPool;
use cosmocore::ledger::Ledger;
use cosmocore::logging::init_logger;
use cosmocore::metrics;
use cosmocore::prizes::{self, Rarity};

const MAX_DISPATCHER_RETRIES: u32 = 5;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Set up global panic handler to catch panics in dispatcher
    // This allows us to log the panic and continue working instead of terminating
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Load environment variables from .env if present
    let _ = dotenv();

    match cli.command {
        Some(Commands::Run) => {
            log::info!("Running bot in normal mode");
            run_bot().await
        }
        Some(Commands::RunStaging) => {
            log::info!("Running bot in staging mode");
            if let Err(e) = dotenvy::from_filename(".env.staging") {
                log::warn!("Failed to load .env.staging: {}", e);
            }
            run_bot().await
        }
        Some(Commands::Catalog) => {
            print_catalog();
            Ok(())
        }
        None => {
            log::info!("No command specified, running bot in default mode");
            run_bot().await
        }
    }
}

/// Print the prize catalog with per-tier draw probabilities
fn print_catalog() {
    println!("🌌 Cosmic Treasure Hunt — каталог призов");
    println!("========================================");
    for rarity in Rarity::ALL {
        println!("\n{} — {:.0}%", rarity, prizes::tier_probability(rarity) * 100.0);
        for prize in prizes::CATALOG.iter().filter(|p| p.rarity == rarity) {
            println!("  {} {} ({} 💠)", prize.emoji, prize.name, prize.value);
        }
    }
}

/// Run the Telegram bot
async fn run_bot() -> Result<()> {
    let bot_init_start = std::time::Instant::now();
    log::info!("Starting bot...");

    // Initialize metrics registry
    metrics::init_metrics();

    // Create bot instance
    let bot = create_bot()?;

    // Get bot information
    // Retry if Bot API is still initializing (returns "restart" error)
    let bot_info = {
        let startup_max_retries = 60; // Up to 5 minutes (60 * 5s)
        let mut startup_retry = 0;
        loop {
            match bot.get_me().await {
                Ok(info) => break info,
                Err(e) => {
                    let err_str = e.to_string();
                    let is_retryable = err_str.contains("restart")
                        || err_str.contains("network")
                        || err_str.contains("connection")
                        || err_str.contains("timed out")
                        || err_str.contains("Connection refused");

                    startup_retry += 1;
                    if startup_retry >= startup_max_retries || !is_retryable {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to Bot API after {} retries: {}",
                            startup_retry,
                            e
                        ));
                    }

                    log::warn!(
                        "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                        startup_retry,
                        startup_max_retries,
                        err_str
                    );
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    };
    let bot_username = bot_info.username.as_deref();
    let bot_id = bot_info.id;
    log::info!("Bot username: {:?}, Bot ID: {}", bot_username, bot_id);

    // Set up bot commands in the Telegram UI
    setup_bot_commands(&bot).await?;

    // Create database connection pool
    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );

    // Gift delivery collaborator and the startup pool refresh
    let gift_sender = Arc::new(
        TelegramGiftSender::new(bot.token()).map_err(|e| anyhow::anyhow!("Failed to create gift sender: {}", e))?,
    );
    let gift_pool = Arc::new(GiftPool::new());
    gift_pool.refresh(gift_sender.as_ref()).await;

    let ledger = Arc::new(Ledger::new(
        Arc::clone(&db_pool),
        Arc::clone(&gift_pool),
        gift_sender,
    ));

    // Start Mini App web server if enabled
    if let Ok(webapp_port_str) = std::env::var("WEBAPP_PORT") {
        if let Ok(webapp_port) = webapp_port_str.parse::<u16>() {
            log::info!("Starting Mini App web server on port {}", webapp_port);
            let ledger_webapp = Arc::clone(&ledger);
            let bot_webapp = bot.clone();
            let bot_token_webapp = bot.token().to_string();

            tokio::spawn(async move {
                if let Err(e) = run_webapp_server(webapp_port, ledger_webapp, bot_webapp, bot_token_webapp).await {
                    log::error!("Mini App web server error: {}", e);
                }
            });
        } else {
            log::warn!("Invalid WEBAPP_PORT value: {}", webapp_port_str);
        }
    } else {
        log::info!("WEBAPP_PORT not set, Mini App web server disabled");
    }

    // Create handler dependencies for the modular schema
    let handler_deps = HandlerDeps::new(
        Arc::clone(&db_pool),
        Arc::clone(&ledger),
        bot_username.map(|s| s.to_string()),
        bot_id,
    );

    // Create the dispatcher handler tree using the modular schema
    let handler = schema(handler_deps);

    let init_elapsed = bot_init_start.elapsed();
    log::info!("Starting bot in long polling mode");
    log::info!("================================================");
    log::info!("🎉 Bot initialization complete in {:.2}s", init_elapsed.as_secs_f64());
    log::info!("📡 Ready to receive updates!");
    log::info!("================================================");

    // Run the dispatcher with retry logic
    let mut retry_count = 0;
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        // Create a new dispatcher in a separate task to isolate panics;
        // "TX is dead" panics are caught via the JoinHandle
        let handle = tokio::spawn(async move {
            run_dispatcher(bot_clone, handler_clone).await;
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    let panic_msg = join_err.to_string();
                    log::error!("Dispatcher panicked: {}", panic_msg);

                    if retry_count < MAX_DISPATCHER_RETRIES {
                        retry_count += 1;
                        log::info!(
                            "Retrying dispatcher connection after panic (attempt {}/{})...",
                            retry_count,
                            MAX_DISPATCHER_RETRIES
                        );
                        exponential_backoff(retry_count).await;
                    } else {
                        log::error!("Max retries reached after panic. Exiting...");
                        break;
                    }
                } else {
                    log::warn!("Dispatcher task was cancelled: {}", join_err);
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn run_dispatcher(bot: Bot, handler: teloxide::dispatching::UpdateHandler<cosmobot::HandlerError>) {
    use teloxide::update_listeners::Polling;

    // Polling listener that drops pending updates on start
    let listener = Polling::builder(bot.clone()).drop_pending_updates().build();

    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;
}

/// Exponential backoff delay for retries
async fn exponential_backoff(retry_count: u32) {
    let delay = Duration::from_secs(EXPONENTIAL_BACKOFF_BASE.pow(retry_count));
    sleep(delay).await;
}
