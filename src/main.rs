//! API сервер слияния таблиц

use anyhow::Context;

use datafusion_ml::service::{self, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env().context("failed to read DFML_* settings")?;
    tracing::info!(
        max_rows = settings.max_rows,
        max_body_mb = settings.max_body_mb,
        job_ttl_secs = settings.job_ttl.as_secs(),
        "Settings loaded"
    );

    service::serve(settings).await
}
