//! Status API route handlers.
//!
//! All endpoints return JSON. Handlers never touch engine state directly:
//! reads come from the published status and writes are sent as commands.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use crate::engine::{Command, CommandError, PreferenceUpdate, ServiceHandle};
use crate::types::{
    format_time_left, Deltas, Direction, EngineStatus, PercentChange, RateStatuses, Resolution,
    ResolvedRate, UserPreference,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub handle: ServiceHandle,
    pub spot_providers: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(handle: ServiceHandle, spot_providers: Vec<String>) -> Self {
        Self {
            handle,
            spot_providers,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DeltaView {
    pub value: String,
    pub direction: Direction,
}

impl From<PercentChange> for DeltaView {
    fn from(c: PercentChange) -> Self {
        Self {
            value: c.formatted(),
            direction: c.direction,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeltasView {
    pub rate: DeltaView,
    pub spot: DeltaView,
    pub total: DeltaView,
}

impl From<Deltas> for DeltasView {
    fn from(d: Deltas) -> Self {
        Self {
            rate: d.rate.into(),
            spot: d.spot.into(),
            total: d.total.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub syncing: bool,
    pub spot: Resolution,
    pub rate: ResolvedRate,
    pub settlement: Resolution,
    pub per_unit_value: f64,
    pub total_value: f64,
    pub spread_percent: f64,
    pub deltas: DeltasView,
    pub preferences: UserPreference,
    pub cycle_count: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub next_refresh_at: Option<DateTime<Utc>>,
    pub time_left: Option<String>,
    pub last_error: Option<String>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvidersResponse {
    pub rates: RateStatuses,
    pub spot_providers: Vec<String>,
    pub spot_preference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualRateRequest {
    pub rate: f64,
}

/// Error body: `{"error": "..."}` with the given status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "engine service is not running")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

fn status_response(state: &ApiState) -> StatusResponse {
    let status: EngineStatus = state.handle.status.borrow().clone();
    let now = Utc::now();
    let time_left = status.next_refresh_at.map(|at| {
        let left = (at - now).to_std().unwrap_or_default();
        format_time_left(left)
    });

    StatusResponse {
        syncing: state.handle.in_flight.is_active(),
        spot: status.spot,
        rate: status.rate,
        settlement: status.settlement,
        per_unit_value: status.per_unit_value,
        total_value: status.total_value,
        spread_percent: status.spread_percent,
        deltas: status.deltas.into(),
        preferences: status.preferences,
        cycle_count: status.cycle_count,
        last_cycle_at: status.last_cycle_at,
        next_refresh_at: status.next_refresh_at,
        time_left,
        last_error: status.last_error,
        uptime_secs: (now - state.started_at).num_seconds(),
    }
}

/// Send a command that carries a reply channel and wait for the answer.
/// Invalid input maps to 400, an engine fault to 500.
async fn request(state: &ApiState, build: impl FnOnce(oneshot::Sender<Result<(), CommandError>>) -> Command) -> Result<(), ApiError> {
    let (tx, rx) = oneshot::channel();
    state
        .handle
        .commands
        .send(build(tx))
        .await
        .map_err(|_| ApiError::unavailable())?;

    match rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(CommandError::Rejected(message))) => Err(ApiError::new(StatusCode::BAD_REQUEST, message)),
        Ok(Err(CommandError::Failed(message))) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message)),
        Err(_) => Err(ApiError::unavailable()),
    }
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(status_response(&state))
}

/// GET /api/providers
pub async fn get_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let status = state.handle.status.borrow();
    Json(ProvidersResponse {
        rates: status.statuses,
        spot_providers: state.spot_providers.clone(),
        spot_preference: status.preferences.spot_preference.clone(),
    })
}

/// POST /api/refresh
pub async fn post_refresh(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state.handle.in_flight.is_active() {
        return Err(ApiError::new(StatusCode::CONFLICT, "a refresh is already in flight"));
    }
    state
        .handle
        .commands
        .send(Command::Refresh)
        .await
        .map_err(|_| ApiError::unavailable())?;
    debug!("Refresh requested via API");
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/rate
pub async fn post_manual_rate(
    State(state): State<AppState>,
    Json(body): Json<ManualRateRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    request(&state, |reply| Command::ManualRate { value: body.rate, reply }).await?;
    Ok(Json(status_response(&state)))
}

/// PUT /api/preferences
pub async fn put_preferences(
    State(state): State<AppState>,
    Json(update): Json<PreferenceUpdate>,
) -> Result<Json<StatusResponse>, ApiError> {
    request(&state, |reply| Command::UpdatePreferences { update, reply }).await?;
    Ok(Json(status_response(&state)))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
