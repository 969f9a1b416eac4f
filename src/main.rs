//! Greenlight API server.
//!
//! Configuration is read from the environment (see [`greenlight_api::config`]),
//! after loading `.env` if present.
//!
//! # Shutdown
//!
//! On SIGINT or SIGTERM the server stops accepting connections and finishes
//! in-flight requests. It then stops the admission sweeper, waits up to
//! `SHUTDOWN_DRAIN_TIMEOUT_SECS` for background tasks and closes the
//! database pool.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use greenlight_api::admission::{AdmissionGate, SystemClock};
use greenlight_api::api::{AppState, router};
use greenlight_api::config::{AppConfig, LogFormat};
use greenlight_api::infrastructure::{
    HttpMailer, LogMailer, Mailer, RepositoryFactory, TaskDrain,
};

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration error: {error}");
            return ExitCode::FAILURE;
        }
    };

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    let cores = std::thread::available_parallelism().map_or(16, std::num::NonZeroUsize::get);
    if let Some((threads, capped)) = config.runtime.worker_threads_for(cores) {
        if capped {
            eprintln!("Warning: WORKER_THREADS exceeds four per core, capping to {threads}");
        }
        builder.worker_threads(threads);
    }

    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create tokio runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async_main(config))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "greenlight_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn async_main(config: AppConfig) -> ExitCode {
    init_tracing(config.log_format);

    tracing::info!(
        name = %config.app.name,
        environment = %config.app.environment,
        version = %config.app.version,
        storage_mode = ?config.storage.mode,
        "Starting Greenlight API"
    );

    let repositories = match RepositoryFactory::new(config.storage.clone()).create().await {
        Ok(repositories) => repositories,
        Err(error) => {
            tracing::error!(%error, "Failed to initialize repositories");
            return ExitCode::FAILURE;
        }
    };

    let gate = match AdmissionGate::start(config.admission, Arc::new(SystemClock)) {
        Ok(gate) => gate,
        Err(error) => {
            tracing::error!(%error, "Invalid admission configuration");
            return ExitCode::FAILURE;
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.mailer.url {
        Some(url) => {
            tracing::info!(%url, "Mail relay configured");
            Arc::new(HttpMailer::new(
                url.clone(),
                config.mailer.sender.clone(),
                config.mailer.timeout,
            ))
        }
        None => {
            tracing::info!("No mail relay configured, emails will be logged");
            Arc::new(LogMailer)
        }
    };

    let background = TaskDrain::new();
    let state = AppState::new(
        &repositories,
        mailer,
        Arc::clone(&gate),
        background.clone(),
        config.app.clone(),
    )
    .with_password_cost(config.auth.password_cost);
    let application = router(state, &config.http);

    let listener = match TcpListener::bind(config.http.address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, address = %config.http.address, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    let served = axum::serve(
        listener,
        application.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    let mut exit = ExitCode::SUCCESS;
    if let Err(error) = served {
        tracing::error!(%error, "Server error");
        exit = ExitCode::FAILURE;
    }

    gate.stop().await;
    tracing::info!(
        outstanding = background.outstanding(),
        "Waiting for background tasks"
    );
    match background.wait_timeout(config.shutdown.drain_timeout).await {
        Ok(()) => tracing::info!(faults = background.faults(), "Background tasks drained"),
        Err(error) => tracing::warn!(%error, "Background drain timed out"),
    }

    if let Some(pool) = repositories.pool {
        pool.close().await;
        tracing::info!("Database pool closed");
    }

    tracing::info!("Server shutdown complete");
    exit
}

/// Completes on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
