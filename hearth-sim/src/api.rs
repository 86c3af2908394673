use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use hearth_core::{
    AlertRecord, Band, CalibrationRecord, DeviceId, DeviceKind, ProcessedReading, TelemetryState,
    ThresholdStatus,
};
use serde::{Deserialize, Serialize};

use crate::simulator::Simulator;

pub type ApiState = Arc<Simulator>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

fn not_registered(id: &DeviceId) -> ApiError {
    ApiError::NotFound(format!("device {id} is not registered"))
}

pub fn router(simulator: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/devices", get(list_devices))
        .route("/devices/{id}/telemetry", get(telemetry))
        .route("/devices/{id}/processed", get(processed))
        .route("/devices/{id}/calibration", get(calibration))
        .route("/devices/{id}/alerts", get(alerts))
        .route("/devices/{id}/thresholds/{parameter}", get(threshold_status))
        .with_state(simulator)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: bool,
    pub devices: usize,
}

async fn health(State(simulator): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        running: simulator.is_running(),
        devices: simulator.device_ids().len(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub connected: bool,
}

async fn list_devices(State(simulator): State<ApiState>) -> Json<Vec<DeviceSummary>> {
    let devices = simulator
        .device_ids()
        .into_iter()
        .filter_map(|id| {
            let kind = simulator.kind(&id)?;
            let connected = simulator.telemetry(&id)?.connected;
            Some(DeviceSummary { id, kind, connected })
        })
        .collect();
    Json(devices)
}

async fn telemetry(
    State(simulator): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<TelemetryState>, ApiError> {
    let id = DeviceId::from(id);
    simulator
        .telemetry(&id)
        .map(Json)
        .ok_or_else(|| not_registered(&id))
}

async fn processed(
    State(simulator): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessedReading>, ApiError> {
    let id = DeviceId::from(id);
    simulator
        .latest_processed(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no processed reading for device {id}")))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CalibrationResponse {
    pub record: Option<CalibrationRecord>,
    pub needs_calibration: bool,
    pub pending_samples: usize,
    pub required_samples: usize,
}

async fn calibration(
    State(simulator): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<CalibrationResponse>, ApiError> {
    let id = DeviceId::from(id);
    let kind = simulator.kind(&id).ok_or_else(|| not_registered(&id))?;
    let service = &simulator.services().calibration;

    Ok(Json(CalibrationResponse {
        record: service.record(&id),
        needs_calibration: service.needs_calibration(&id, kind),
        pending_samples: service.pending_samples(&id).len(),
        required_samples: service.required_samples(kind),
    }))
}

async fn alerts(
    State(simulator): State<ApiState>,
    Path(id): Path<String>,
) -> Json<Vec<AlertRecord>> {
    Json(simulator.alert_history(&DeviceId::from(id)))
}

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThresholdResponse {
    pub parameter: String,
    pub value: f64,
    pub status: ThresholdStatus,
    pub band: Option<Band>,
}

async fn threshold_status(
    State(simulator): State<ApiState>,
    Path((id, parameter)): Path<(String, String)>,
    Query(query): Query<ThresholdQuery>,
) -> Json<ThresholdResponse> {
    let id = DeviceId::from(id);
    Json(ThresholdResponse {
        status: simulator.threshold_status(&id, &parameter, query.value),
        band: simulator.services().thresholds.band(&id, &parameter),
        value: query.value,
        parameter,
    })
}
