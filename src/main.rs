use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use a11y_scanner::config::{default_data_dir, CliArgs, ScannerConfig, API_KEY_ENV};
use a11y_scanner::reconcile;
use a11y_scanner::scan_log::{ActivityLevel, ActivitySource};
use a11y_scanner::server;
use a11y_scanner::settings::{load_settings, save_settings, settings_path};
use a11y_scanner::state::ScannerState;
use a11y_scanner::store::ScanDb;

/// Console output always; a daily rolling file when `log_dir` is set.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "a11y_scanner=info,tower_http=info".into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "a11y-scanner.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref());

    info!("Starting a11y-scanner v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let settings_file = settings_path(&data_dir);
    let settings = load_settings(&settings_file);
    if !settings_file.exists() {
        save_settings(&settings_file, &settings);
    }

    let mut args = args;
    args.data_dir = Some(data_dir);
    let config = ScannerConfig::from_args(args, &settings);
    info!("Data dir: {:?}", config.data_dir);
    info!(
        "Workers: {}, queue capacity: {}, model: {}",
        config.workers, config.queue_capacity, config.model
    );
    if config.inference_api_key.is_none() {
        tracing::warn!(
            "{} is not set; every scan will use the fallback analysis",
            API_KEY_ENV
        );
    }

    let db = Arc::new(ScanDb::open(&config.db_path())?);
    let port = config.port;
    let stale_after = config.stale_after;
    let state = ScannerState::from_config(config, db.clone())?;

    reconcile::fail_orphans_at_startup(&db, &state.logs).await?;
    let _reconciler = reconcile::spawn_reconciler(db, state.logs.clone(), stale_after);

    state
        .logs
        .emit(
            ActivitySource::Api,
            ActivityLevel::Info,
            format!("Scanner starting on port {}", port),
        )
        .await;

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Scanner listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Runs still in flight are failed by the startup reconcile next time.
    info!("Scanner shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
