//! REST surface exposed to the consuming layer.
//!
//! Read-only views of the published snapshot plus the cache and poller
//! controls. An empty machine list means "data not yet available", never a
//! fault; a machine the upstream cannot reach keeps serving its last known
//! values, with staleness visible only through `updated_at`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use gymwatch_types::{DeviceRecord, LatLng};

use crate::derived::BuildingGeometry;
use crate::poller::Poller;
use crate::state::{AppState, DeviceStats};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Snapshot data
        .route("/api/machines", get(list_machines))
        .route("/api/machines/{id}", get(get_machine))
        .route("/api/machines/{id}/peak", get(get_peak_hours))
        .route("/api/gyms", get(list_gyms))
        // Poller control
        .route("/api/poller/start", post(poller_start))
        .route("/api/poller/stop", post(poller_stop))
        // Cache busting
        .route("/api/cache/clear", post(cache_clear))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub poller: PollerStatus,
    pub devices: Vec<DeviceStats>,
}

/// Poller status.
#[derive(Debug, Serialize)]
pub struct PollerStatus {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub uptime_seconds: Option<u64>,
    pub ticks: u64,
    pub ticks_skipped: u64,
}

/// Service status endpoint.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let running = state.poller.is_running();
    let started_at = state.poller.started_at();
    let uptime_seconds = started_at.map(|s| {
        let now = OffsetDateTime::now_utc();
        (now - s).whole_seconds().max(0) as u64
    });

    let devices = state.poller.device_stats.read().await.clone();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        poller: PollerStatus {
            running,
            started_at,
            uptime_seconds,
            ticks: state.poller.ticks(),
            ticks_skipped: state.poller.ticks_skipped(),
        },
        devices,
    })
}

/// The currently published snapshot.
///
/// An empty array means the first poll cycle has not completed yet.
async fn list_machines(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceRecord>> {
    Json(state.snapshot().as_ref().clone())
}

/// One machine's record from the snapshot.
async fn get_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceRecord>, AppError> {
    state
        .snapshot()
        .iter()
        .find(|record| record.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Machine {} not found", id)))
}

/// Query parameters for peak-hour predictions.
#[derive(Debug, Deserialize)]
struct PeakQuery {
    /// Date in `YYYY-MM-DD` form.
    date: String,
    /// Peak (`true`) or ideal (`false`) intervals.
    #[serde(default)]
    peak: Option<bool>,
}

/// Predicted peak/ideal intervals response.
#[derive(Debug, Serialize)]
pub struct PeakHoursResponse {
    pub machine_id: String,
    pub date: String,
    pub peak: bool,
    pub hours: Vec<String>,
}

/// Derived peak/ideal usage hours for one machine.
async fn get_peak_hours(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PeakQuery>,
) -> Result<Json<PeakHoursResponse>, AppError> {
    let date = Date::parse(&query.date, format_description!("[year]-[month]-[day]"))
        .map_err(|e| AppError::BadRequest(format!("Invalid date '{}': {}", query.date, e)))?;
    let want_peak = query.peak.unwrap_or(true);

    let (gym, thing_id) = {
        let config = state.config.read().await;
        let machine = config
            .machines
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Machine {} not found", id)))?;
        let thing_id = machine
            .thing_id
            .ok_or_else(|| AppError::NotFound(format!("Machine {} has no upstream mapping", id)))?;
        (machine.gym.clone(), thing_id)
    };

    let hours = state
        .derived
        .peak_hours(&gym, thing_id, date, want_peak)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(PeakHoursResponse {
        machine_id: id,
        date: query.date,
        peak: want_peak,
        hours: hours
            .iter()
            .map(|h| h.format(&Rfc3339).unwrap_or_else(|_| h.to_string()))
            .collect(),
    }))
}

/// One gym with its cached geometry, if resolvable.
#[derive(Debug, Serialize)]
pub struct GymResponse {
    pub id: String,
    pub label: String,
    pub floors: Vec<u32>,
    pub coords: Option<LatLng>,
    pub outline: Option<Vec<LatLng>>,
}

/// The gym directory with cached coordinates and outlines.
///
/// Geometry that cannot be resolved yet degrades to `null` fields rather
/// than failing the listing.
async fn list_gyms(State(state): State<Arc<AppState>>) -> Json<Vec<GymResponse>> {
    let gyms = {
        let config = state.config.read().await;
        config.gyms.clone()
    };

    let mut responses = Vec::with_capacity(gyms.len());
    for gym in gyms {
        let geometry = match &gym.place_id {
            Some(place_id) => state.derived.building_geometry(place_id).await.ok(),
            None => None,
        };
        let (coords, outline) = match geometry {
            Some(BuildingGeometry { coords, outline }) => (Some(coords), Some(outline)),
            None => (None, None),
        };
        responses.push(GymResponse {
            id: gym.id,
            label: gym.label,
            floors: gym.floors,
            coords,
            outline,
        });
    }

    Json(responses)
}

/// Response from poller control actions.
#[derive(Debug, Serialize)]
pub struct PollerActionResponse {
    pub success: bool,
    pub message: String,
    pub running: bool,
}

/// Start the poller.
async fn poller_start(State(state): State<Arc<AppState>>) -> Json<PollerActionResponse> {
    if state.poller.is_running() {
        return Json(PollerActionResponse {
            success: true,
            message: "Poller already running".to_string(),
            running: true,
        });
    }

    Poller::new(Arc::clone(&state)).start().await;

    Json(PollerActionResponse {
        success: true,
        message: "Poller started".to_string(),
        running: state.poller.is_running(),
    })
}

/// Stop the poller. Idempotent.
async fn poller_stop(State(state): State<Arc<AppState>>) -> Json<PollerActionResponse> {
    state.poller.signal_stop();

    Json(PollerActionResponse {
        success: true,
        message: "Poller stopped".to_string(),
        running: false,
    })
}

/// Cache clear response.
#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub success: bool,
    pub message: String,
}

/// Manual cache busting: drop every entry under the subsystem namespace.
async fn cache_clear(State(state): State<Arc<AppState>>) -> Result<Json<CacheClearResponse>, AppError> {
    state
        .cache
        .clear()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(CacheClearResponse {
        success: true,
        message: "Cache cleared".to_string(),
    }))
}

/// API error responses.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
