use clap::Parser;
use dotenv::dotenv;
use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use uptimed::config::{Config, DaemonSettings};
use uptimed::monitor::Engine;
use uptimed::notifications::NotificationService;
use uptimed::store::SqliteStore;
use uptimed::version::VERSION;
use uptimed::web::{AppState, router};

#[derive(Parser, Debug)]
#[command(name = "uptimed", version = VERSION, about = "Uptime monitoring daemon")]
struct Args {
    /// Path to the monitor configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Port for the status dashboard.
    #[arg(long)]
    port: Option<u16>,
}

fn init_logging(log_dir: &Path) {
    // File: JSON, rotated daily
    let file_appender = rolling::daily(log_dir, "uptimed.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler.");
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
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    let args = Args::parse();
    let settings = DaemonSettings::resolve(args.config, args.port, |key| std::env::var(key).ok())?;

    init_logging(&settings.log_dir);
    info!(version = VERSION, "Starting uptimed...");

    let config = match Config::load(&settings.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Critical error loading configuration. Exiting.");
            return Err(e.into());
        }
    };
    let targets = config.targets()?;

    let store = Arc::new(SqliteStore::open(settings.database_path()).await?);
    info!(path = %settings.database_path().display(), "History database ready.");

    let history_days = config.global.history_days;
    let pruning_store = Arc::clone(&store);
    tokio::spawn(async move {
        if let Err(e) = pruning_store.prune_older_than(history_days).await {
            warn!(error = %e, "Failed to prune check history.");
        }
    });

    let notifier = Arc::new(NotificationService::from_config(&config.notifications));
    let engine = Engine::new(
        targets.clone(),
        config.engine_settings(),
        store.clone(),
        notifier,
    );
    engine.start();

    let app = router(AppState::new(Arc::clone(&store), targets)?);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Dashboard listening.");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    engine.stop().await;
    store.close().await;
    info!("uptimed stopped.");

    served?;
    Ok(())
}
