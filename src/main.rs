use std::sync::Arc;

use anyhow::Context;

use message_finder::config::{EngineConfig, ServerConfig, TelegramConfig};
use message_finder::control::control_routes;
use message_finder::engine::{Engine, EngineDeps};
use message_finder::executor::LogExecutor;
use message_finder::feed::JsonLinesFeed;
use message_finder::logging::LogControl;
use message_finder::notify::{LogNotifier, TelegramNotifier, spawn_notifier};
use message_finder::store::JsonFileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let engine_config = EngineConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;
    let telegram_config = TelegramConfig::from_env()?;

    let logs = LogControl::init(server_config.log_dir.as_deref());

    eprintln!("🔎 Message Finder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Control WS: ws://0.0.0.0:{}/ws", server_config.ws_port);
    eprintln!("   Control API: http://0.0.0.0:{}/api/status", server_config.ws_port);
    eprintln!("   State: {}", server_config.state_path.display());
    eprintln!(
        "   Cooldown: {}s for {}",
        engine_config.cooldown.as_secs(),
        if engine_config.restricted_authors.is_empty() {
            "nobody".to_string()
        } else {
            engine_config.restricted_authors.join(", ")
        }
    );
    eprintln!("   Feed: JSON lines on stdin\n");

    // ── Engine ──────────────────────────────────────────────────────────
    let deps = EngineDeps {
        feed: Arc::new(JsonLinesFeed::stdin()),
        executor: Arc::new(LogExecutor),
        store: Arc::new(JsonFileStore::new(&server_config.state_path)),
    };
    let (engine, engine_task) = Engine::start(engine_config, deps).await?;

    let status = engine.status().await?;
    logs.apply_initial(status.settings.log_level);
    let _log_follower = logs.follow(&engine);

    // ── Notifiers ───────────────────────────────────────────────────────
    let _log_notifier = spawn_notifier(Arc::new(LogNotifier), engine.subscribe());
    if let Some(telegram_config) = telegram_config {
        let telegram = Arc::new(TelegramNotifier::new(&telegram_config));
        let _telegram_notifier = spawn_notifier(telegram.clone(), engine.subscribe());
        let _telegram_commands = telegram.spawn_command_poller(engine.clone());
        eprintln!("   Telegram: enabled (chat {})", telegram_config.chat_id);
    } else {
        eprintln!("   Telegram: disabled");
    }

    // ── Control server ──────────────────────────────────────────────────
    let app = control_routes(engine.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.ws_port))
        .await
        .with_context(|| format!("failed to bind control port {}", server_config.ws_port))?;
    tracing::info!(port = server_config.ws_port, "Control server started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Control server stopped");
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            tracing::info!("Shutting down");
        }
        result = engine_task => {
            result.context("engine task panicked")?;
            tracing::warn!("Engine task exited");
        }
    }

    engine.shutdown().await.ok();
    Ok(())
}
