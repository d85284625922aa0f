//! API server entry point.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use orderbook::{ChannelObserver, Observer};
use orders::config::{Config, Database, LogFormat};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How long to wait for the publisher to drain after the server stops.
const PUBLISHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Runs the server over `event_store` until a shutdown signal arrives.
async fn serve<S: EventStore + 'static>(
    event_store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>> {
    let (observer, receiver) = ChannelObserver::channel(config.observer_buffer);
    let publisher = orders::publisher::spawn(receiver);

    let observers: [Arc<dyn Observer>; 1] = [Arc::new(observer)];
    let state = orders::create_state(event_store, config.repository_config(), observers);
    let app = orders::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router, and with it the last observer sender, is gone now.
    match tokio::time::timeout(PUBLISHER_DRAIN_TIMEOUT, publisher).await {
        Ok(Ok(published)) => tracing::info!(published, "event publisher drained"),
        Ok(Err(err)) => tracing::warn!(error = %err, "event publisher task failed"),
        Err(_) => tracing::warn!("event publisher did not drain in time"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Load configuration
    let config = Config::from_env()?;

    // 2. Initialize tracing
    init_tracing(&config);

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 4. Pick the event store and run the server
    match &config.database {
        Database::InMemory => {
            tracing::info!("using in-memory event store");
            serve(InMemoryEventStore::new(), &config, metrics_handle).await?;
        }
        Database::Postgres { url } => {
            tracing::info!("using postgres event store");
            let store = PostgresEventStore::connect(url).await?;
            store.run_migrations().await?;
            serve(store, &config, metrics_handle).await?;
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
