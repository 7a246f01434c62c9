//! Route definitions

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};

use lumen_core::{ShowMode, ShowStatus};

use super::handlers::{
    ApiResponse, DevicesQuery, SetIntensityRequest, SetLatencyRequest, SetModeRequest,
    StartShowRequest,
};
use super::server::AppState;
use super::stream::{stream_audio, stream_probe};
use crate::govee::DiscoveredDevice;

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(message.into())))
}

/// Run a director call off the async workers; start/stop talk to the lights
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("Blocking handler task failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })
}

/// Build the router
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stream.wav", get(stream_audio).head(stream_probe))
        .route("/stream", get(stream_audio).head(stream_probe))
        .route("/api/lightshow/status", get(get_status))
        .route("/api/lightshow/start", post(start_show))
        .route("/api/lightshow/stop", post(stop_show))
        .route("/api/lightshow/mode", put(set_mode))
        .route("/api/lightshow/latency", put(set_latency))
        .route("/api/lightshow/intensity", put(set_intensity))
        .route("/api/lightshow/devices", get(list_devices))
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// GET /api/lightshow/status
async fn get_status(State(state): State<AppState>) -> ApiResult<ShowStatus> {
    let director = state.director.clone();
    let status = blocking(move || director.status()).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// POST /api/lightshow/start
async fn start_show(
    State(state): State<AppState>,
    Json(request): Json<StartShowRequest>,
) -> ApiResult<ShowStatus> {
    request
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let defaults = &state.defaults;
    let mode = request
        .mode
        .unwrap_or_else(|| defaults.mode.as_str().to_string());
    let latency_ms = request.latency_ms.unwrap_or(defaults.latency_ms);
    let intensity = request.intensity.unwrap_or(defaults.intensity);
    let device_ids = request.device_ids;

    let director = state.director.clone();
    let status = blocking(move || {
        director
            .start_named(&mode, &device_ids, latency_ms, intensity)
            .map(|()| director.status())
    })
    .await?
    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(Json(ApiResponse::success(status)))
}

/// POST /api/lightshow/stop
async fn stop_show(State(state): State<AppState>) -> ApiResult<ShowStatus> {
    let director = state.director.clone();
    let status = blocking(move || {
        director.stop();
        director.status()
    })
    .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// PUT /api/lightshow/mode
async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<SetModeRequest>,
) -> ApiResult<ShowStatus> {
    let mode: ShowMode = request
        .mode
        .parse()
        .map_err(|e: lumen_core::ShowError| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let director = state.director.clone();
    let status = blocking(move || director.set_mode(mode).map(|()| director.status()))
        .await?
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(ApiResponse::success(status)))
}

/// PUT /api/lightshow/latency
async fn set_latency(
    State(state): State<AppState>,
    Json(request): Json<SetLatencyRequest>,
) -> ApiResult<ShowStatus> {
    let director = state.director.clone();
    let status = blocking(move || {
        director.set_latency(request.latency_ms);
        director.status()
    })
    .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// PUT /api/lightshow/intensity
async fn set_intensity(
    State(state): State<AppState>,
    Json(request): Json<SetIntensityRequest>,
) -> ApiResult<ShowStatus> {
    let director = state.director.clone();
    let status = blocking(move || {
        director.set_intensity(request.intensity);
        director.status()
    })
    .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// GET /api/lightshow/devices - LAN devices, `?refresh=true` forces a scan
async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<DevicesQuery>,
) -> ApiResult<Vec<DiscoveredDevice>> {
    let Some(govee) = state.govee.clone() else {
        return Ok(Json(ApiResponse::success(Vec::new())));
    };
    let devices = blocking(move || govee.discover_devices(query.refresh)).await?;
    Ok(Json(ApiResponse::success(devices)))
}
