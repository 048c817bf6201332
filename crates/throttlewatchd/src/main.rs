// # throttlewatchd - Throttle Monitor Daemon
//
// This daemon is a THIN integration layer:
// - All reconciliation logic lives in throttlewatch-core
// - Collaborators (status source, automation, notifier) live in their crates
// - DO NOT add transition or retry logic here
//
// The throttlewatchd daemon is responsible for:
// 1. Loading the JSON configuration and environment overrides
// 2. Initializing logging and the runtime
// 3. Wiring the status source, automation and notifier into the engine
// 4. Serving the HTTP surface and the hourly report
// 5. Shutting everything down on SIGTERM/SIGINT
//
// ## Configuration
//
// - `THROTTLEWATCH_CONFIG`: Path to the JSON configuration (default `config.json`)
// - `THROTTLEWATCH_PORT`: Overrides `http.port`
// - `THROTTLEWATCH_LEDGER_PATH`: Overrides the ledger with a file store at this path
// - `THROTTLEWATCH_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export THROTTLEWATCH_CONFIG=/etc/throttlewatch/config.json
// export THROTTLEWATCH_LEDGER_PATH=/var/lib/throttlewatch/throttle_history.json
//
// throttlewatchd
// ```

mod events;
mod http;
mod report;

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use throttlewatch_core::config::LedgerStoreConfig;
use throttlewatch_core::engine::{AccountSource, PollScheduler, Reconciler};
use throttlewatch_core::{MonitorConfig, ledger};
use throttlewatch_netcup::NetcupStatusSourceFactory;
use throttlewatch_telegram::TelegramNotifier;
use throttlewatch_vertex::VertexAutomation;
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default configuration path
const DEFAULT_CONFIG_PATH: &str = "config.json";

/// How long background tasks get to finish after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings: the configuration document plus environment overrides
struct Settings {
    config: MonitorConfig,
    log_level: Level,
}

impl Settings {
    /// Load the configuration file and apply environment overrides
    fn from_env() -> Result<Self> {
        let path =
            env::var("THROTTLEWATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let document = std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot read configuration file {}", path))?;
        let mut config = MonitorConfig::from_json(&document)?;

        apply_overrides(
            &mut config,
            env::var("THROTTLEWATCH_PORT").ok(),
            env::var("THROTTLEWATCH_LEDGER_PATH").ok(),
        )?;

        let log_level =
            parse_log_level(&env::var("THROTTLEWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".into()))?;

        config.validate()?;

        Ok(Self { config, log_level })
    }
}

/// Apply the environment overrides to a parsed configuration
fn apply_overrides(
    config: &mut MonitorConfig,
    port: Option<String>,
    ledger_path: Option<String>,
) -> Result<()> {
    if let Some(port) = port {
        config.http.port = port
            .trim()
            .parse()
            .with_context(|| format!("THROTTLEWATCH_PORT '{}' is not a valid port", port))?;
    }

    if let Some(path) = ledger_path
        && !path.trim().is_empty()
    {
        config.ledger = LedgerStoreConfig::File { path };
    }

    Ok(())
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "THROTTLEWATCH_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting throttlewatchd daemon");
    info!(
        "Configuration loaded: {} account(s), vertex {}, telegram {}",
        settings.config.accounts.len(),
        if settings.config.vertex.is_some() { "on" } else { "off" },
        if settings.config.telegram.is_some() { "on" } else { "off" },
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(settings.config).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DaemonExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: MonitorConfig) -> Result<()> {
    let factory = NetcupStatusSourceFactory::new();
    let accounts: Vec<AccountSource> = config
        .accounts
        .iter()
        .map(|account| AccountSource::from_config(account, &factory))
        .collect();

    let ready = accounts
        .iter()
        .filter(|a| matches!(a, AccountSource::Ready(_)))
        .count();
    if ready == 0 {
        warn!("No usable account configured; the monitor will publish an empty status");
    }

    let ledger_store = ledger::from_config(&config.ledger)
        .await
        .context("Failed to open the ledger store")?;

    let (mut reconciler, events) = Reconciler::new(accounts, ledger_store, &config.engine)?;

    let vertex = match &config.vertex {
        Some(vertex) => Some(Arc::new(VertexAutomation::new(vertex)?)),
        None => None,
    };
    let telegram = match &config.telegram {
        Some(telegram) => Some(Arc::new(TelegramNotifier::new(telegram)?)),
        None => None,
    };

    if let Some(vertex) = &vertex {
        info!("Registering Vertex automation");
        reconciler = reconciler.with_automation(vertex.clone());
    }
    if let Some(telegram) = &telegram {
        info!("Registering Telegram notifier");
        reconciler = reconciler.with_notifier(telegram.clone());
    }

    let reporter = match (&vertex, &telegram) {
        (Some(vertex), Some(telegram)) => {
            Some(report::Reporter::new(vertex.clone(), telegram.clone()))
        }
        _ => None,
    };

    let mut scheduler = PollScheduler::new(reconciler, &config.engine);
    let cache = scheduler.cache();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let event_task = tokio::spawn(events::log_events(events));

    let mut engine_shutdown = shutdown_rx.clone();
    let engine_task = tokio::spawn(async move {
        scheduler
            .run_until(async move {
                let _ = engine_shutdown.changed().await;
            })
            .await
    });

    let report_task = match (&reporter, config.report_enabled()) {
        (Some(reporter), true) => Some(tokio::spawn(report::run_hourly(
            reporter.clone(),
            config.report.minute,
            shutdown_rx.clone(),
        ))),
        _ => None,
    };

    let state = http::AppState {
        cache,
        reporter,
        telegram_enabled: telegram.is_some(),
        dashboard_path: config.http.dashboard_path.as_deref().map(Arc::from),
    };
    let app = http::router(state, &config.http.webhook_path);

    let addr = format!("{}:{}", config.http.bind, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!("HTTP server listening on {}", addr);
    info!("Webhook: {}", config.http.webhook_path);

    let mut http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    let signal = wait_for_shutdown_signal().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        match engine_task.await {
            Ok(Err(e)) => error!("Engine stopped with error: {}", e),
            Err(e) => error!("Engine task failed: {}", e),
            Ok(Ok(())) => {}
        }
        match http_task.await {
            Ok(Err(e)) => error!("HTTP server stopped with error: {}", e),
            Err(e) => error!("HTTP task failed: {}", e),
            Ok(Ok(())) => {}
        }
        if let Some(task) = report_task {
            let _ = task.await;
        }
        let _ = event_task.await;
    })
    .await;

    if drained.is_err() {
        anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
    }

    info!("Daemon stopped");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
