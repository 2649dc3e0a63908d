use anyhow::Context;
use resonance_worker::config::Config;
use resonance_worker::Worker;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resonance_worker=debug,resonance_job_queue=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Resonance worker");

    let config = Config::from_env().context("Failed to load worker configuration")?;
    let shutdown_timeout = config.shutdown_timeout();
    let worker = Worker::start(&config).await?;

    shutdown_signal().await?;
    tracing::info!("Draining in-flight jobs");

    if tokio::time::timeout(shutdown_timeout, worker.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Timed out waiting for in-flight jobs"
        );
    }

    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        result = terminate => {
            result?;
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    Ok(())
}
