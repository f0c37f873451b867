//! # Exam Notifier Bot Main Entry Point
//!
//! Initializes logging, loads configuration and stored state, builds the
//! conversation engine, starts the cron jobs and health server, and runs the
//! Telegram bot.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exam_notifier_bot::bot::commands::{Command, MenuLabels};
use exam_notifier_bot::bot::handlers::{message::TelegramOutbound, BotHandler};
use exam_notifier_bot::config::Config;
use exam_notifier_bot::engine::{Engine, EngineSettings};
use exam_notifier_bot::services::health::HealthService;
use exam_notifier_bot::services::notifier::NotifierService;
use exam_notifier_bot::services::schedule_source::{CachedScheduleSource, SpreadsheetSource};
use exam_notifier_bot::storage::persistence::SnapshotPersistence;
use exam_notifier_bot::storage::roster::RosterStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exam_notifier_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("Starting Exam Notifier Bot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded - Data dir: {}, HTTP Port: {}, canonical day: {}",
        config.data_dir.display(),
        config.http_port,
        config.canonical_weekday
    );

    // Initialize bot
    info!("Initializing Telegram bot...");
    let bot = Bot::new(&config.telegram_bot_token);
    let me = bot.get_me().await?;
    let username = me.user.username.clone().unwrap_or_default();
    bot.set_my_commands(Command::bot_commands()).await?;
    info!("Telegram bot initialized as @{}", username);

    // Load stored state and build the engine
    let labels = MenuLabels::default();
    let spreadsheet = SpreadsheetSource::new(
        config.schedule_url.clone(),
        config.sheet_prefix.clone(),
        labels.grades.clone(),
    );
    let source = Arc::new(CachedScheduleSource::new(Arc::new(spreadsheet)));
    let persistence = SnapshotPersistence::open(config.state_path(), false)?;

    let settings = EngineSettings {
        maintainer_id: config.maintainer_id,
        maintainer_contact: config.maintainer_contact.clone(),
        bot_username: username,
        send_delay: config.send_delay,
        canonical_weekday: config.canonical_weekday,
        ..EngineSettings::new(config.maintainer_id)
    };
    let engine = Arc::new(Engine::new(
        settings,
        labels,
        RosterStore::new(config.roster_path()),
        persistence,
        source,
        Arc::new(TelegramOutbound::new(bot.clone())),
    )?);
    info!("Engine ready with {} subscribers", engine.subscriber_count());

    let handler = BotHandler::new(engine.clone());

    // Initialize and start the cron jobs
    info!("Initializing notifier service...");
    let mut notifier = match NotifierService::new(engine.clone()).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to create notifier service: {}", e);
            return Err(anyhow::anyhow!("Failed to create notifier service: {}", e));
        }
    };

    if let Err(e) = notifier.start().await {
        tracing::error!("Failed to start notifier service: {}", e);
    } else {
        info!("Notifier service started with {} jobs", notifier.job_ids().len());
    }

    // Initialize health service
    let health_service = HealthService::new(engine.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to port {}: {}", config.http_port, e))?;

    info!("Health check server starting on port {}", config.http_port);

    // Run both the bot and health server concurrently
    let bot_task = tokio::spawn(async move {
        Dispatcher::builder(bot, handler.schema())
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    });

    let health_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_service.router).await {
            tracing::error!("Health server error: {}", e);
        }
    });

    // Wait for either task to complete (which would indicate shutdown)
    tokio::select! {
        result1 = bot_task => {
            if let Err(e) = result1 {
                tracing::error!("Bot task error: {}", e);
            }
        }
        result2 = health_task => {
            if let Err(e) = result2 {
                tracing::error!("Health task error: {}", e);
            }
        }
    }

    // Stop cron jobs and write the final snapshot on shutdown
    if let Err(e) = notifier.stop().await {
        tracing::warn!("Error stopping notifier service: {}", e);
    }
    if let Err(e) = engine.persistence().flush() {
        tracing::warn!("Error writing final snapshot: {}", e);
    }

    info!("Application stopped");
    Ok(())
}
