//! Shared entity types for the scheduler: `Target`, `Schedule`, `Run`,
//! `Attempt`, and the enums that classify their state. Every other crate
//! in the workspace builds on these — no crate re-declares its own copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// HTTP method a `Target` is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(anyhow::anyhow!("unknown http method: {other}")),
        }
    }
}

/// A callable HTTP endpoint, independent of any particular schedule.
/// Mutable via the control API; deletion cascades to its Schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    /// String→string header mapping, stored as JSON.
    pub headers: serde_json::Value,
    pub body_template: Option<String>,
    /// Seconds, constrained to [1.0, 120.0] at the control-plane boundary.
    pub timeout_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a schedule fires on a fixed interval or a cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleType {
    Interval,
    Cron,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Interval => "INTERVAL",
            ScheduleType::Cron => "CRON",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "INTERVAL" => Ok(ScheduleType::Interval),
            "CRON" => Ok(ScheduleType::Cron),
            other => Err(anyhow::anyhow!("unknown schedule type: {other}")),
        }
    }
}

/// Lifecycle state of a `Schedule`. EXPIRED is terminal with respect to
/// firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Expired,
    Deleted,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "ACTIVE",
            ScheduleStatus::Paused => "PAUSED",
            ScheduleStatus::Expired => "EXPIRED",
            ScheduleStatus::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "ACTIVE" => Ok(ScheduleStatus::Active),
            "PAUSED" => Ok(ScheduleStatus::Paused),
            "EXPIRED" => Ok(ScheduleStatus::Expired),
            "DELETED" => Ok(ScheduleStatus::Deleted),
            other => Err(anyhow::anyhow!("unknown schedule status: {other}")),
        }
    }
}

/// A recurring firing rule bound to a `Target`.
///
/// Invariants: exactly one of `interval_seconds`/`cron_expression` is set,
/// matching `schedule_type`; `run_count` never decreases; `expires_at`,
/// once set, is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub target_id: Uuid,
    pub schedule_type: ScheduleType,
    pub interval_seconds: Option<i64>,
    pub cron_expression: Option<String>,
    pub status: ScheduleStatus,
    pub started_at: DateTime<Utc>,
    /// Window length in seconds from `started_at`; `expires_at` is derived
    /// from this at creation and never recomputed afterward.
    pub duration_seconds: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_runs: Option<i64>,
    pub run_count: i64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one firing of a `Schedule`. Transitions are monotonic through
/// the DAG PENDING -> RUNNING -> {SUCCESS, FAILED, TIMEOUT}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed | RunStatus::Timeout)
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "PENDING" => Ok(RunStatus::Pending),
            "RUNNING" => Ok(RunStatus::Running),
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            "TIMEOUT" => Ok(RunStatus::Timeout),
            other => Err(anyhow::anyhow!("unknown run status: {other}")),
        }
    }
}

/// The error taxonomy the Classifier maps every exception or status code
/// into. `None` means the attempt succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorType {
    None,
    Timeout,
    Dns,
    Connection,
    Ssl,
    ClientError,
    ServerError,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::None => "NONE",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::Dns => "DNS",
            ErrorType::Connection => "CONNECTION",
            ErrorType::Ssl => "SSL",
            ErrorType::ClientError => "CLIENT_ERROR",
            ErrorType::ServerError => "SERVER_ERROR",
            ErrorType::Unknown => "UNKNOWN",
        }
    }

    /// Retryable per §7: everything but CLIENT_ERROR (non-retryable 4xx)
    /// and NONE (nothing to retry, the attempt succeeded).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorType::None | ErrorType::ClientError)
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "NONE" => Ok(ErrorType::None),
            "TIMEOUT" => Ok(ErrorType::Timeout),
            "DNS" => Ok(ErrorType::Dns),
            "CONNECTION" => Ok(ErrorType::Connection),
            "SSL" => Ok(ErrorType::Ssl),
            "CLIENT_ERROR" => Ok(ErrorType::ClientError),
            "SERVER_ERROR" => Ok(ErrorType::ServerError),
            "UNKNOWN" => Ok(ErrorType::Unknown),
            other => Err(anyhow::anyhow!("unknown error type: {other}")),
        }
    }
}

/// One planned execution of a `Schedule`, potentially covering several
/// `Attempt`s. `idempotency_key` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub idempotency_key: String,
    /// Instant the Engine intended this Run to fire.
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub attempt_count: i32,
    pub final_status_code: Option<i32>,
    pub final_error_type: ErrorType,
    pub final_error_message: Option<String>,
}

/// A single HTTP request issued while executing a `Run`.
/// Invariant: `latency_ms` equals `completed_at - started_at` when both
/// are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub run_id: Uuid,
    /// 1-based, dense: attempt_numbers within a Run form 1..N with no gaps.
    pub attempt_number: i32,
    pub request_url: String,
    pub request_method: HttpMethod,
    pub request_headers: serde_json::Value,
    pub request_body: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
    pub status_code: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    /// Possibly-truncated decoded response text; see the Executor's
    /// truncation rule.
    pub response_body: Option<String>,
    pub response_size_bytes: Option<i64>,
    pub error_type: ErrorType,
    pub error_message: Option<String>,
}
