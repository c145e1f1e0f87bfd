//! HTTP API: синхронное и фоновое слияние

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::jobs::{JobStatus, JobStore, JobView};
use super::settings::Settings;
use crate::config::FusionConfig;
use crate::error::FusionError;
use crate::models::MetricMap;
use crate::types::Dataset;
use crate::fuse;

type Record = serde_json::Map<String, serde_json::Value>;

/// Тело запроса: две таблицы в виде записей и настройки слияния
#[derive(Debug, Clone, Deserialize)]
pub struct FuseRequest {
    pub df_a: Vec<Record>,
    pub df_b: Vec<Record>,
    #[serde(flatten)]
    pub config: FusionConfig,
    /// Какие части вернуть: fused, a_enriched, b_enriched, metrics
    #[serde(default)]
    pub return_parts: Option<BTreeSet<String>>,
    /// Сколько строк каждой таблицы вернуть
    #[serde(default)]
    pub row_limit: Option<usize>,
    #[serde(default)]
    pub columns_include: Option<Vec<String>>,
    #[serde(default)]
    pub columns_exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FuseResponse {
    pub fused: Option<Vec<Record>>,
    pub a_enriched: Option<Vec<Record>>,
    pub b_enriched: Option<Vec<Record>>,
    pub metrics_a_to_b: Option<BTreeMap<String, MetricMap>>,
    pub metrics_b_to_a: Option<BTreeMap<String, MetricMap>>,
    pub overlap_features: Vec<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Fusion(FusionError),
    TooLarge(String),
    Timeout(u64),
    NotFound,
    Internal(String),
}

impl From<FusionError> for ApiError {
    fn from(e: FusionError) -> Self {
        ApiError::Fusion(e)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Fusion(e) => write!(f, "{}", e),
            ApiError::TooLarge(msg) => write!(f, "{}", msg),
            ApiError::Timeout(secs) => write!(f, "fusion did not finish within {} seconds", secs),
            ApiError::NotFound => write!(f, "Job not found"),
            ApiError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Fusion(e) if e.is_caller_error() => StatusCode::BAD_REQUEST,
            ApiError::Fusion(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    jobs: Arc<JobStore<FuseResponse>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jobs = JobStore::new(settings.job_ttl, settings.job_capacity);
        Self {
            settings: Arc::new(settings),
            jobs: Arc::new(jobs),
        }
    }
}

pub fn router(settings: Settings) -> Router {
    let body_limit = settings.body_limit_bytes();
    let cors = cors_layer(&settings.cors_origins);

    let routes = Router::new()
        .route("/health", get(health))
        .route("/fuse", post(fuse_sync))
        .route("/fuse/async", post(fuse_async))
        .route("/fuse/async/:job_id", get(fuse_async_status));

    // Основные пути под /v1, без префикса остаются для совместимости
    let app = Router::new()
        .nest("/v1", routes.clone())
        .merge(routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(AppState::new(settings));

    match cors {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    Some(layer.allow_origin(AllowOrigin::list(parsed)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn fuse_sync(
    State(state): State<AppState>,
    Json(req): Json<FuseRequest>,
) -> Result<Json<FuseResponse>, ApiError> {
    info!(rows_a = req.df_a.len(), rows_b = req.df_b.len(), "Fuse request");
    check_limits(&state.settings, &req)?;
    Ok(Json(run_with_deadline(&state.settings, req).await?))
}

async fn fuse_async(
    State(state): State<AppState>,
    Json(req): Json<FuseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_limits(&state.settings, &req)?;

    let job_id = state.jobs.create();
    info!(job_id = %job_id, rows_a = req.df_a.len(), rows_b = req.df_b.len(), "Created async job");

    tokio::spawn(async move {
        let status = match run_with_deadline(&state.settings, req).await {
            Ok(result) => {
                info!(job_id = %job_id, "Job completed");
                JobStatus::Done { result }
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job failed");
                JobStatus::Error {
                    error: e.to_string(),
                }
            }
        };
        state.jobs.finish(job_id, status);
    });

    Ok(Json(serde_json::json!({ "job_id": job_id })))
}

async fn fuse_async_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView<FuseResponse>>, ApiError> {
    let job_id = Uuid::parse_str(&job_id).map_err(|_| ApiError::NotFound)?;
    state.jobs.get(&job_id).map(Json).ok_or(ApiError::NotFound)
}

fn check_limits(settings: &Settings, req: &FuseRequest) -> Result<(), ApiError> {
    let max = settings.max_rows;
    if req.df_a.len() > max || req.df_b.len() > max {
        return Err(ApiError::TooLarge(format!(
            "Dataset exceeds the configured maximum of {} rows",
            max
        )));
    }
    if req.row_limit.is_some_and(|limit| limit > max) {
        return Err(ApiError::TooLarge(
            "Row limit exceeds configured maximum".to_string(),
        ));
    }
    Ok(())
}

/// Слияние в пуле блокирующих задач с ограничением по времени
async fn run_with_deadline(settings: &Settings, req: FuseRequest) -> Result<FuseResponse, ApiError> {
    let deadline = settings.fuse_timeout;
    let task = tokio::task::spawn_blocking(move || perform_fusion(&req));

    match tokio::time::timeout(deadline, task).await {
        Err(_) => Err(ApiError::Timeout(deadline.as_secs())),
        Ok(Err(join_error)) => Err(ApiError::Internal(join_error.to_string())),
        Ok(Ok(result)) => result.map_err(ApiError::from),
    }
}

/// Синхронное слияние запроса и формирование ответа
pub fn perform_fusion(req: &FuseRequest) -> Result<FuseResponse, FusionError> {
    let a = Dataset::from_records(&req.df_a)?;
    let b = Dataset::from_records(&req.df_b)?;
    let result = fuse(&a, &b, &req.config)?;

    let wanted = |part: &str| req.return_parts.as_ref().map_or(true, |parts| parts.contains(part));
    let shape = |dataset: &Dataset| {
        shape_records(
            dataset,
            req.row_limit,
            req.columns_include.as_deref(),
            req.columns_exclude.as_deref(),
        )
    };

    Ok(FuseResponse {
        fused: wanted("fused").then(|| shape(&result.fused)),
        a_enriched: wanted("a_enriched").then(|| shape(&result.a_enriched)),
        b_enriched: wanted("b_enriched").then(|| shape(&result.b_enriched)),
        metrics_a_to_b: wanted("metrics").then(|| result.metrics_a_to_b.clone()),
        metrics_b_to_a: wanted("metrics").then(|| result.metrics_b_to_a.clone()),
        overlap_features: result.overlap_features.clone(),
    })
}

/// Отбор колонок и строк; неизвестные имена колонок игнорируются
fn shape_records(
    dataset: &Dataset,
    row_limit: Option<usize>,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> Vec<Record> {
    let mut names: Vec<&str> = dataset.column_names();

    if let Some(include) = include {
        let kept: Vec<&str> = include
            .iter()
            .map(String::as_str)
            .filter(|name| dataset.has_column(name))
            .collect();
        if !kept.is_empty() {
            names = kept;
        }
    }
    if let Some(exclude) = exclude {
        names.retain(|name| !exclude.iter().any(|e| e == name));
    }

    let rows = row_limit.map_or(dataset.n_rows(), |limit| limit.min(dataset.n_rows()));
    let records = dataset.to_records();
    records
        .into_iter()
        .take(rows)
        .map(|record| {
            names
                .iter()
                .filter_map(|name| record.get(*name).map(|v| (name.to_string(), v.clone())))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn small_request() -> Value {
        json!({
            "df_a": [
                {"age": 21, "sex": "M", "income": 1000.5},
                {"age": 35, "sex": "F", "income": 2500.25},
                {"age": 47, "sex": "M", "income": 3100.75},
                {"age": 52, "sex": "F", "income": 4000.1}
            ],
            "df_b": [
                {"age": 30, "sex": "F", "owns_car": true},
                {"age": 45, "sex": "M", "owns_car": false},
                {"age": 60, "sex": "F", "owns_car": true}
            ],
            "n_estimators": 5,
            "cv_splits": 2
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(router(Settings::default()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_versioned_routes() {
        let app = router(Settings::default());
        let (status, body) = send(app.clone(), "GET", "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(app, "POST", "/v1/fuse", Some(small_request())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overlap_features"], json!(["age", "sex"]));
    }

    #[tokio::test]
    async fn test_fuse_returns_all_parts() {
        let (status, body) =
            send(router(Settings::default()), "POST", "/fuse", Some(small_request())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fused"].as_array().unwrap().len(), 7);
        assert!(body["a_enriched"][0]["owns_car"].is_boolean());
        assert!(body["b_enriched"][0]["income"].is_number());
        assert_eq!(body["overlap_features"], json!(["age", "sex"]));
        assert!(body["metrics_a_to_b"]["income"].is_object());
    }

    #[tokio::test]
    async fn test_return_parts_and_row_limit() {
        let mut request = small_request();
        request["return_parts"] = json!(["a_enriched"]);
        request["row_limit"] = json!(2);
        request["columns_exclude"] = json!(["sex"]);

        let (status, body) = send(router(Settings::default()), "POST", "/fuse", Some(request)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["fused"].is_null());
        assert!(body["metrics_a_to_b"].is_null());
        let rows = body["a_enriched"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("sex").is_none());
        assert!(rows[0].get("owns_car").is_some());
    }

    #[tokio::test]
    async fn test_no_overlap_is_bad_request() {
        let request = json!({
            "df_a": [{"x": 1}, {"x": 2}],
            "df_b": [{"y": 1}, {"y": 2}]
        });
        let (status, body) = send(router(Settings::default()), "POST", "/fuse", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("no overlapping"));
    }

    #[tokio::test]
    async fn test_row_limit_above_maximum_is_rejected() {
        let settings = Settings {
            max_rows: 3,
            ..Settings::default()
        };
        let (status, _) = send(router(settings), "POST", "/fuse", Some(small_request())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    /// Запускает фоновую задачу и ждёт, пока она выйдет из `pending`
    async fn run_job(app: Router, request: Value) -> Value {
        let (status, body) = send(app.clone(), "POST", "/fuse/async", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        let uri = format!("/fuse/async/{}", body["job_id"].as_str().unwrap());

        for _ in 0..200 {
            let (status, body) = send(app.clone(), "GET", &uri, None).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "pending" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Value::Null
    }

    #[tokio::test]
    async fn test_async_job_completes() {
        let job = run_job(router(Settings::default()), small_request()).await;

        assert_eq!(job["status"], "done");
        assert_eq!(job["result"]["fused"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_async_job_reports_fusion_error() {
        let request = json!({
            "df_a": [{"x": 1}, {"x": 2}],
            "df_b": [{"y": 1}, {"y": 2}]
        });
        let job = run_job(router(Settings::default()), request).await;

        assert_eq!(job["status"], "error");
        assert!(job["error"].as_str().unwrap().contains("no overlapping"));
        assert!(job.get("result").is_none());
    }

    fn no_time() -> Settings {
        Settings {
            fuse_timeout: Duration::ZERO,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_gateway_timeout() {
        let (status, body) = send(router(no_time()), "POST", "/fuse", Some(small_request())).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["detail"].as_str().unwrap().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_async_deadline_marks_job_failed() {
        let job = run_job(router(no_time()), small_request()).await;

        assert_eq!(job["status"], "error");
        assert!(job["error"].as_str().unwrap().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = router(Settings::default());
        let (status, _) = send(app.clone(), "GET", "/fuse/async/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/fuse/async/{}", Uuid::new_v4());
        let (status, body) = send(app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Job not found");
    }
}
