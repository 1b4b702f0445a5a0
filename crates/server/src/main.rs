mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sniper_core::engine::StopSource;
use sniper_core::{
    create_notifier, load_config, validate_config, CaptchaSolver, Engine, HttpCaptchaSolver,
    HttpProvider, JsonFileStore, LogBus, Notifier, Provider, SanitizedConfig, Store,
};

use supervisor::{run_bus_tail, run_supervisor};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long shutdown waits for queued notifications to be delivered
const NOTIFIER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = std::env::var("SNIPER_LOG_JSON").is_ok_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    init_logging();

    // Determine config path
    let config_path = std::env::var("SNIPER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = serde_json::to_string(&SanitizedConfig::from(&config))
        .context("Failed to encode configuration")?;
    let config_hash = format!("{:x}", Sha256::digest(sanitized.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded"
    );

    let json_store = JsonFileStore::new(config.store.path.clone());
    let document = json_store
        .load()
        .await
        .with_context(|| format!("Failed to open store at {:?}", config.store.path))?;
    info!(
        accounts = document.accounts.len(),
        targets = document.targets.len(),
        "Store opened"
    );
    let store: Arc<dyn Store> = Arc::new(json_store);
    let provider: Arc<dyn Provider> = Arc::new(
        HttpProvider::new(&config.provider).context("Failed to create provider client")?,
    );
    info!("Provider gateway at {}", config.provider.base_url);
    let solver: Arc<dyn CaptchaSolver> = Arc::new(
        HttpCaptchaSolver::new(&config.solver).context("Failed to create solver client")?,
    );
    info!("Captcha solver at {}", config.solver.base_url);

    // Notifier worker drains the queue until every notifier clone is dropped
    let (notifier, notifier_worker) = create_notifier(&config.notifier);
    let notifier_handle = tokio::spawn(notifier_worker.run());
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);

    let bus = LogBus::from_config(&config.log_bus);
    let engine = Engine::new(
        config.engine.clone(),
        config.captcha.clone(),
        store,
        provider,
        solver,
        notifier,
        bus,
    );

    let shutdown = StopSource::new();
    let supervisor_handle = tokio::spawn(run_supervisor(
        engine.clone(),
        config.engine.auto_run_interval(),
        shutdown.token(),
    ));
    let tail_handle = tokio::spawn(run_bus_tail(engine.clone(), shutdown.token()));
    info!("Sniper {} running", VERSION);

    shutdown_signal().await;
    info!("Shutting down...");

    shutdown.stop();
    let _ = supervisor_handle.await;
    let _ = tail_handle.await;

    engine
        .stop_all(config.engine.stop_timeout())
        .await
        .context("Failed to stop engine")?;
    engine.close().await;

    // Dropping the engine releases the last notifier clone, letting the worker
    // flush its queue and exit.
    drop(engine);
    if tokio::time::timeout(NOTIFIER_DRAIN_TIMEOUT, notifier_handle)
        .await
        .is_err()
    {
        error!("Notifier worker did not stop in time");
    } else {
        info!("Notifier worker stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
