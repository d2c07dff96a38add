use std::time::Duration;

use anyhow::Context;
use idforge_db::Repositories;
use idforge_sweeper::DEFAULT_SWEEP_INTERVAL;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// | Env Var               | Required | Default |
/// |-----------------------|----------|---------|
/// | `DATABASE_URL`        | **yes**  | --      |
/// | `SWEEP_INTERVAL_SECS` | no       | `3600`  |
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idforge_sweeper=info,idforge_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let interval = match std::env::var("SWEEP_INTERVAL_SECS") {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .context("SWEEP_INTERVAL_SECS must be a whole number of seconds")?;
            anyhow::ensure!(secs > 0, "SWEEP_INTERVAL_SECS must be positive");
            Duration::from_secs(secs)
        }
        Err(_) => DEFAULT_SWEEP_INTERVAL,
    };

    let pool = idforge_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    idforge_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    idforge_db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database ready");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    idforge_sweeper::run(Repositories::postgres(pool), interval, cancel).await;
    Ok(())
}
