//! Axum router and route handlers for the control API (§6).

use std::fmt::Write as _;
use std::sync::Arc;

use apisched_db::RunFilter;
use apisched_domain::{ErrorType, Run, RunStatus, Schedule, ScheduleStatus, Target};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::api_types::{
    clamp_timeout, default_method_or, validate_url, ApiError, GlobalMetrics, MessageResponse, RunDetailResponse,
    RunListResponse, RunQuery, ScheduleCreate, ScheduleMetrics, TargetCreate, TargetUpdate,
};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let prefix = state.settings.api_prefix.clone();
    let api = Router::new()
        .route("/targets", post(create_target).get(list_targets))
        .route("/targets/:id", get(get_target).patch(update_target).delete(delete_target))
        .route("/schedules", post(create_schedule).get(list_schedules))
        .route("/schedules/:id", get(get_schedule).delete(delete_schedule))
        .route("/schedules/:id/pause", post(pause_schedule))
        .route("/schedules/:id/resume", post(resume_schedule))
        .route("/runs", get(list_runs))
        .route("/runs/count", get(count_runs))
        .route("/runs/:id", get(get_run))
        .route("/metrics", get(get_metrics))
        .route("/metrics/prometheus", get(get_metrics_prometheus))
        .with_state(state.clone());

    Router::new().nest(&prefix, api).route("/health", get(health))
}

async fn health() -> Json<MessageResponse> {
    Json(MessageResponse { message: "ok".to_string() })
}

// ---------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------

async fn create_target(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TargetCreate>,
) -> Result<(StatusCode, Json<Target>), ApiError> {
    validate_url(&body.url)?;
    let method = default_method_or(&body.method)?;
    let timeout = clamp_timeout(
        body.timeout_seconds.unwrap_or(state.settings.default_timeout_seconds),
        state.settings.max_timeout_seconds,
    )?;
    let now = Utc::now();
    let target = Target {
        id: Uuid::new_v4(),
        name: body.name,
        url: body.url,
        method,
        headers: body.headers.unwrap_or_else(|| serde_json::json!({})),
        body_template: body.body_template,
        timeout_seconds: timeout,
        created_at: now,
        updated_at: now,
    };
    apisched_db::insert_target(&state.pool, &target).await?;
    Ok((StatusCode::CREATED, Json(target)))
}

async fn list_targets(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Target>>, ApiError> {
    Ok(Json(apisched_db::list_targets(&state.pool).await?))
}

async fn get_target(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Target>, ApiError> {
    apisched_db::get_target(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("target not found"))
}

async fn update_target(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<TargetUpdate>,
) -> Result<Json<Target>, ApiError> {
    let mut target = apisched_db::get_target(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("target not found"))?;

    if let Some(name) = body.name {
        target.name = name;
    }
    if let Some(url) = body.url {
        validate_url(&url)?;
        target.url = url;
    }
    if let Some(method) = body.method {
        target.method = default_method_or(&Some(method))?;
    }
    if let Some(headers) = body.headers {
        target.headers = headers;
    }
    if body.body_template.is_some() {
        target.body_template = body.body_template;
    }
    if let Some(timeout) = body.timeout_seconds {
        target.timeout_seconds = clamp_timeout(timeout, state.settings.max_timeout_seconds)?;
    }
    target.updated_at = Utc::now();

    apisched_db::update_target(&state.pool, &target).await?;
    Ok(Json(target))
}

/// Deregisters the target's Schedules from the Trigger Engine before the
/// cascade delete drops their rows, so the Engine never keeps ticking a
/// `schedule_id` whose row no longer exists.
async fn delete_target(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let schedules = apisched_db::list_schedules_by_target(&state.pool, id).await?;
    let engine = state.coordinator.engine();
    for schedule in &schedules {
        engine.deregister(schedule.id).await;
    }

    if apisched_db::delete_target(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("target not found"))
    }
}

// ---------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------

async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScheduleCreate>,
) -> Result<(StatusCode, Json<Schedule>), ApiError> {
    let schedule_type = body.validate()?;
    apisched_db::get_target(&state.pool, body.target_id)
        .await?
        .ok_or_else(|| ApiError::not_found("target not found"))?;

    let now = Utc::now();
    let started_at = body.started_at.unwrap_or(now);
    let schedule = Schedule {
        id: Uuid::new_v4(),
        name: body.name,
        target_id: body.target_id,
        schedule_type,
        interval_seconds: body.interval_seconds,
        cron_expression: body.cron_expression,
        status: ScheduleStatus::Active,
        started_at,
        duration_seconds: body.duration_seconds,
        expires_at: None,
        max_runs: body.max_runs,
        run_count: 0,
        next_run_at: None,
        last_run_at: None,
        created_at: now,
        updated_at: now,
    };

    let schedule = state.coordinator.add_schedule(schedule).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn list_schedules(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Schedule>>, ApiError> {
    Ok(Json(apisched_db::list_schedules(&state.pool).await?))
}

async fn get_schedule(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Schedule>, ApiError> {
    apisched_db::get_schedule(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("schedule not found"))
}

async fn pause_schedule(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Schedule>, ApiError> {
    let schedule = apisched_db::get_schedule(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("schedule not found"))?;
    if schedule.status != ScheduleStatus::Active {
        return Err(ApiError::validation("schedule is not ACTIVE"));
    }
    Ok(Json(state.coordinator.pause_schedule(id).await?))
}

async fn resume_schedule(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Schedule>, ApiError> {
    let schedule = apisched_db::get_schedule(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("schedule not found"))?;
    if schedule.status != ScheduleStatus::Paused {
        return Err(ApiError::validation("schedule is not PAUSED"));
    }
    Ok(Json(state.coordinator.resume_schedule(id).await?))
}

async fn delete_schedule(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if state.coordinator.delete_schedule(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("schedule not found"))
    }
}

// ---------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------

fn build_filter(q: &RunQuery) -> Result<RunFilter, ApiError> {
    let status = q
        .status
        .as_deref()
        .map(|s| RunStatus::parse(s).map_err(|e| ApiError::validation(e.to_string())))
        .transpose()?;
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let offset = q.offset.unwrap_or(0).max(0);
    Ok(RunFilter {
        schedule_id: q.schedule_id,
        status,
        start_time: q.start_time,
        end_time: q.end_time,
        limit,
        offset,
    })
}

async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RunQuery>,
) -> Result<Json<RunListResponse>, ApiError> {
    let filter = build_filter(&q)?;
    let (runs, total) = state.coordinator.list_runs(&filter).await?;
    Ok(Json(RunListResponse { runs, total }))
}

async fn count_runs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RunQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = build_filter(&q)?;
    let total = apisched_db::count_runs(&state.pool, &filter).await?;
    Ok(Json(serde_json::json!({ "count": total })))
}

async fn get_run(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<RunDetailResponse>, ApiError> {
    let run: Run = apisched_db::get_run(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("run not found"))?;
    let attempts = apisched_db::list_attempts_for_run(&state.pool, id).await?;
    Ok(Json(RunDetailResponse { run, attempts }))
}

// ---------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------

const SCHEDULE_STATUSES: [ScheduleStatus; 4] = [
    ScheduleStatus::Active,
    ScheduleStatus::Paused,
    ScheduleStatus::Expired,
    ScheduleStatus::Deleted,
];
const RUN_STATUSES: [RunStatus; 5] = [
    RunStatus::Pending,
    RunStatus::Running,
    RunStatus::Success,
    RunStatus::Failed,
    RunStatus::Timeout,
];
const ERROR_TYPES: [ErrorType; 6] = [
    ErrorType::Timeout,
    ErrorType::Dns,
    ErrorType::Connection,
    ErrorType::Ssl,
    ErrorType::ClientError,
    ErrorType::ServerError,
];

async fn collect_metrics(state: &AppState) -> Result<GlobalMetrics, ApiError> {
    let targets_total = apisched_db::count_targets(&state.pool).await?;

    let mut schedules_by_status = std::collections::HashMap::new();
    for status in SCHEDULE_STATUSES {
        schedules_by_status.insert(
            status.as_str().to_string(),
            apisched_db::count_schedules_by_status(&state.pool, status).await?,
        );
    }

    let mut runs_by_status_all_time = std::collections::HashMap::new();
    for status in RUN_STATUSES {
        runs_by_status_all_time
            .insert(status.as_str().to_string(), apisched_db::count_runs_by_status_all_time(&state.pool, status).await?);
    }

    let since_1h = Utc::now() - chrono::Duration::hours(1);
    let mut runs_by_status_last_hour = std::collections::HashMap::new();
    for status in RUN_STATUSES {
        runs_by_status_last_hour
            .insert(status.as_str().to_string(), apisched_db::count_runs_by_status_since(&state.pool, status, since_1h).await?);
    }

    let since_24h = Utc::now() - chrono::Duration::hours(24);
    let mut runs_by_status_last_24h = std::collections::HashMap::new();
    for status in RUN_STATUSES {
        runs_by_status_last_24h
            .insert(status.as_str().to_string(), apisched_db::count_runs_by_status_since(&state.pool, status, since_24h).await?);
    }

    let mut errors_by_type = std::collections::HashMap::new();
    for error_type in ERROR_TYPES {
        errors_by_type.insert(
            error_type.as_str().to_string(),
            apisched_db::count_attempts_by_error_type(&state.pool, error_type).await?,
        );
    }

    let total_24h = apisched_db::count_runs_since(&state.pool, since_24h).await?;
    let success_24h = *runs_by_status_last_24h.get(RunStatus::Success.as_str()).unwrap_or(&0);
    let success_rate_24h = if total_24h > 0 { success_24h as f64 / total_24h as f64 } else { 0.0 };
    let avg_latency_ms_24h = apisched_db::avg_latency_ms_since(&state.pool, since_24h).await?;

    let mut schedules = Vec::new();
    for status in [ScheduleStatus::Active, ScheduleStatus::Paused] {
        for s in apisched_db::list_schedules_by_status(&state.pool, status).await? {
            let outcomes = apisched_db::schedule_run_outcomes(&state.pool, s.id).await?;
            let success_rate =
                if outcomes.total > 0 { outcomes.successful as f64 / outcomes.total as f64 } else { 0.0 };
            let avg_latency_ms = apisched_db::avg_latency_ms_for_schedule(&state.pool, s.id).await?;
            schedules.push(ScheduleMetrics {
                schedule_id: s.id,
                name: s.name,
                status: s.status.as_str().to_string(),
                run_count: s.run_count,
                successful_runs: outcomes.successful,
                failed_runs: outcomes.failed,
                timeout_runs: outcomes.timeout,
                success_rate,
                avg_latency_ms,
                last_run_at: s.last_run_at,
                next_run_at: s.next_run_at,
            });
        }
    }

    Ok(GlobalMetrics {
        targets_total,
        schedules_by_status,
        runs_by_status_all_time,
        runs_by_status_last_hour,
        runs_by_status_last_24h,
        errors_by_type,
        success_rate_24h,
        avg_latency_ms_24h,
        schedules,
    })
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Result<Json<GlobalMetrics>, ApiError> {
    Ok(Json(collect_metrics(&state).await?))
}

async fn get_metrics_prometheus(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    let m = collect_metrics(&state).await?;
    let mut out = String::new();

    let _ = writeln!(out, "# TYPE api_scheduler_targets_total gauge");
    let _ = writeln!(out, "api_scheduler_targets_total {}", m.targets_total);

    let _ = writeln!(out, "# TYPE api_scheduler_schedules_total gauge");
    for (status, count) in &m.schedules_by_status {
        let _ = writeln!(out, "api_scheduler_schedules_total{{status=\"{status}\"}} {count}");
    }

    let _ = writeln!(out, "# TYPE api_scheduler_runs_last_hour gauge");
    for (status, count) in &m.runs_by_status_last_hour {
        let _ = writeln!(out, "api_scheduler_runs_last_hour{{status=\"{status}\"}} {count}");
    }

    let _ = writeln!(out, "# TYPE api_scheduler_runs_total counter");
    for (status, count) in &m.runs_by_status_all_time {
        let _ = writeln!(out, "api_scheduler_runs_total{{status=\"{status}\"}} {count}");
    }

    if let Some(avg) = m.avg_latency_ms_24h {
        let _ = writeln!(out, "# TYPE api_scheduler_latency_ms gauge");
        let _ = writeln!(out, "api_scheduler_latency_ms {avg}");
    }

    let _ = writeln!(out, "# TYPE api_scheduler_errors_total counter");
    for (error_type, count) in &m.errors_by_type {
        let _ = writeln!(out, "api_scheduler_errors_total{{type=\"{error_type}\"}} {count}");
    }

    Ok(out)
}
