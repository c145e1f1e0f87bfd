//! HTTP-сервис поверх движка слияния

pub mod api;
pub mod jobs;
pub mod settings;

pub use api::{perform_fusion, router, AppState, FuseRequest, FuseResponse};
pub use jobs::{JobStatus, JobStore};
pub use settings::Settings;

/// Запуск сервера до завершения процесса
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr = settings.bind;
    let app = router(settings);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
