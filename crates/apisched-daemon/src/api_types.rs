//! Request/response DTOs for the control API, plus the `ApiError` type
//! every handler converges errors into (§6, §7).

use apisched_domain::{Attempt, HttpMethod, Run, ScheduleType};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct TargetCreate {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub body_template: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TargetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub body_template: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleCreate {
    pub name: String,
    pub target_id: Uuid,
    pub schedule_type: String,
    #[serde(default)]
    pub interval_seconds: Option<i64>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub max_runs: Option<i64>,
}

impl ScheduleCreate {
    pub fn validate(&self) -> Result<ScheduleType, ApiError> {
        let kind = ScheduleType::parse(&self.schedule_type.to_ascii_uppercase())
            .map_err(|_| ApiError::validation("schedule_type must be INTERVAL or CRON"))?;
        match kind {
            ScheduleType::Interval => {
                if self.interval_seconds.unwrap_or(0) < 1 {
                    return Err(ApiError::validation("interval schedules require interval_seconds >= 1"));
                }
            }
            ScheduleType::Cron => {
                let expr = self
                    .cron_expression
                    .as_deref()
                    .ok_or_else(|| ApiError::validation("cron schedules require cron_expression"))?;
                apisched_trigger::parse_five_field_cron(expr)
                    .map_err(|e| ApiError::validation(format!("invalid cron_expression: {e}")))?;
            }
        }
        Ok(kind)
    }
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<Run>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    #[serde(flatten)]
    pub run: Run,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleMetrics {
    pub schedule_id: Uuid,
    pub name: String,
    pub status: String,
    pub run_count: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub timeout_runs: i64,
    pub success_rate: f64,
    pub avg_latency_ms: Option<f64>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct GlobalMetrics {
    pub targets_total: i64,
    pub schedules_by_status: HashMap<String, i64>,
    pub runs_by_status_all_time: HashMap<String, i64>,
    pub runs_by_status_last_hour: HashMap<String, i64>,
    pub runs_by_status_last_24h: HashMap<String, i64>,
    pub errors_by_type: HashMap<String, i64>,
    pub success_rate_24h: f64,
    pub avg_latency_ms_24h: Option<f64>,
    pub schedules: Vec<ScheduleMetrics>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn default_method_or(method: &Option<String>) -> Result<HttpMethod, ApiError> {
    match method {
        Some(m) => HttpMethod::parse(m).map_err(|e| ApiError::validation(e.to_string())),
        None => Ok(HttpMethod::Get),
    }
}

pub fn validate_url(url: &str) -> Result<(), ApiError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ApiError::validation("url must start with http:// or https://"))
    }
}

pub fn clamp_timeout(seconds: f64, max_timeout: f64) -> Result<f64, ApiError> {
    if (1.0..=max_timeout).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(ApiError::validation(format!("timeout_seconds must be in [1, {max_timeout}]")))
    }
}

/// Maps to the control-plane status codes in spec §7: not-found → 404,
/// constraint violation → 422, invalid state transition → 400, anything
/// uncaught → 500 with no stack detail.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Validation(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Validation(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "unhandled control-plane error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub use apisched_domain::{ScheduleStatus, Target as TargetResponse};
