//! Durable persistence for Targets, Schedules, Runs, and Attempts.
//!
//! Free functions over `&PgPool`, one responsibility per call, short-lived
//! transactions — the same shape as the teacher's repository layer. Row
//! mapping is manual (`Row::try_get`) rather than `#[derive(FromRow)]`
//! because several columns round-trip through a taxonomy enum or a JSON
//! header map rather than a primitive sqlx type.

use anyhow::{Context, Result};
use apisched_domain::{Attempt, ErrorType, HttpMethod, Run, RunStatus, Schedule, ScheduleStatus, ScheduleType, Target};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "APISCHED_DATABASE_URL";

/// Connect to Postgres using `APISCHED_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// True when `err` is a unique-constraint violation on `constraint_name`.
/// Postgres error code 23505, matched on the constraint's own name so
/// callers don't misattribute an unrelated uniqueness failure.
pub fn is_unique_violation(err: &sqlx::Error, constraint_name: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return db_err.constraint() == Some(constraint_name);
        }
    }
    false
}

// ---------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------

fn target_from_row(row: &sqlx::postgres::PgRow) -> Result<Target> {
    Ok(Target {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        method: HttpMethod::parse(row.try_get::<String, _>("method")?.as_str())?,
        headers: row.try_get("headers")?,
        body_template: row.try_get("body_template")?,
        timeout_seconds: row.try_get("timeout_seconds")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn insert_target(pool: &PgPool, t: &Target) -> Result<()> {
    sqlx::query(
        "INSERT INTO targets (id, name, url, method, headers, body_template, timeout_seconds, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(t.id)
    .bind(&t.name)
    .bind(&t.url)
    .bind(t.method.as_str())
    .bind(&t.headers)
    .bind(&t.body_template)
    .bind(t.timeout_seconds)
    .bind(t.created_at)
    .bind(t.updated_at)
    .execute(pool)
    .await
    .context("insert target failed")?;
    Ok(())
}

pub async fn get_target(pool: &PgPool, id: Uuid) -> Result<Option<Target>> {
    let row = sqlx::query("SELECT * FROM targets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get target failed")?;
    row.as_ref().map(target_from_row).transpose()
}

pub async fn list_targets(pool: &PgPool) -> Result<Vec<Target>> {
    let rows = sqlx::query("SELECT * FROM targets ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("list targets failed")?;
    rows.iter().map(target_from_row).collect()
}

pub async fn update_target(pool: &PgPool, t: &Target) -> Result<()> {
    let affected = sqlx::query(
        "UPDATE targets SET name = $2, url = $3, method = $4, headers = $5,
         body_template = $6, timeout_seconds = $7, updated_at = $8
         WHERE id = $1",
    )
    .bind(t.id)
    .bind(&t.name)
    .bind(&t.url)
    .bind(t.method.as_str())
    .bind(&t.headers)
    .bind(&t.body_template)
    .bind(t.timeout_seconds)
    .bind(t.updated_at)
    .execute(pool)
    .await
    .context("update target failed")?
    .rows_affected();
    if affected == 0 {
        anyhow::bail!("target {} not found", t.id);
    }
    Ok(())
}

/// Deletes the Target; Schedules/Runs/Attempts cascade via FK constraints.
pub async fn delete_target(pool: &PgPool, id: Uuid) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM targets WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete target failed")?
        .rows_affected();
    Ok(affected > 0)
}

pub async fn count_targets(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM targets")
        .fetch_one(pool)
        .await
        .context("count targets failed")?;
    Ok(row.try_get("n")?)
}

// ---------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------

fn schedule_from_row(row: &sqlx::postgres::PgRow) -> Result<Schedule> {
    Ok(Schedule {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        target_id: row.try_get("target_id")?,
        schedule_type: ScheduleType::parse(row.try_get::<String, _>("schedule_type")?.as_str())?,
        interval_seconds: row.try_get("interval_seconds")?,
        cron_expression: row.try_get("cron_expression")?,
        status: ScheduleStatus::parse(row.try_get::<String, _>("status")?.as_str())?,
        started_at: row.try_get("started_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        expires_at: row.try_get("expires_at")?,
        max_runs: row.try_get("max_runs")?,
        run_count: row.try_get("run_count")?,
        next_run_at: row.try_get("next_run_at")?,
        last_run_at: row.try_get("last_run_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn insert_schedule(pool: &PgPool, s: &Schedule) -> Result<()> {
    sqlx::query(
        "INSERT INTO schedules (id, name, target_id, schedule_type, interval_seconds, cron_expression,
         status, started_at, duration_seconds, expires_at, max_runs,
         run_count, next_run_at, last_run_at, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
    )
    .bind(s.id)
    .bind(&s.name)
    .bind(s.target_id)
    .bind(s.schedule_type.as_str())
    .bind(s.interval_seconds)
    .bind(&s.cron_expression)
    .bind(s.status.as_str())
    .bind(s.started_at)
    .bind(s.duration_seconds)
    .bind(s.expires_at)
    .bind(s.max_runs)
    .bind(s.run_count)
    .bind(s.next_run_at)
    .bind(s.last_run_at)
    .bind(s.created_at)
    .bind(s.updated_at)
    .execute(pool)
    .await
    .context("insert schedule failed")?;
    Ok(())
}

pub async fn get_schedule(pool: &PgPool, id: Uuid) -> Result<Option<Schedule>> {
    let row = sqlx::query("SELECT * FROM schedules WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get schedule failed")?;
    row.as_ref().map(schedule_from_row).transpose()
}

/// Load the Schedule together with its Target in one round trip — the
/// Coordinator's fire handler needs both (§4.5 step 2).
pub async fn get_schedule_with_target(pool: &PgPool, id: Uuid) -> Result<Option<(Schedule, Target)>> {
    let schedule = match get_schedule(pool, id).await? {
        Some(s) => s,
        None => return Ok(None),
    };
    let target = get_target(pool, schedule.target_id).await?;
    Ok(target.map(|t| (schedule, t)))
}

pub async fn list_schedules(pool: &PgPool) -> Result<Vec<Schedule>> {
    let rows = sqlx::query("SELECT * FROM schedules ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("list schedules failed")?;
    rows.iter().map(schedule_from_row).collect()
}

pub async fn list_schedules_by_status(pool: &PgPool, status: ScheduleStatus) -> Result<Vec<Schedule>> {
    let rows = sqlx::query("SELECT * FROM schedules WHERE status = $1 ORDER BY created_at DESC")
        .bind(status.as_str())
        .fetch_all(pool)
        .await
        .context("list schedules by status failed")?;
    rows.iter().map(schedule_from_row).collect()
}

/// Used to deregister a Target's Schedules from the Trigger Engine before
/// the cascade delete drops their rows (§4.2 `delete_target`).
pub async fn list_schedules_by_target(pool: &PgPool, target_id: Uuid) -> Result<Vec<Schedule>> {
    let rows = sqlx::query("SELECT * FROM schedules WHERE target_id = $1")
        .bind(target_id)
        .fetch_all(pool)
        .await
        .context("list schedules by target failed")?;
    rows.iter().map(schedule_from_row).collect()
}

/// Schedules eligible for the 60s window sweeper: ACTIVE and already past
/// `expires_at`.
pub async fn find_expired_active_schedules(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Schedule>> {
    let rows = sqlx::query(
        "SELECT * FROM schedules WHERE status = 'ACTIVE' AND expires_at IS NOT NULL AND expires_at <= $1",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .context("find expired active schedules failed")?;
    rows.iter().map(schedule_from_row).collect()
}

pub async fn update_schedule(pool: &PgPool, s: &Schedule) -> Result<()> {
    let affected = sqlx::query(
        "UPDATE schedules SET name=$2, status=$3, expires_at=$4, run_count=$5, next_run_at=$6,
         last_run_at=$7, updated_at=$8 WHERE id=$1",
    )
    .bind(s.id)
    .bind(&s.name)
    .bind(s.status.as_str())
    .bind(s.expires_at)
    .bind(s.run_count)
    .bind(s.next_run_at)
    .bind(s.last_run_at)
    .bind(s.updated_at)
    .execute(pool)
    .await
    .context("update schedule failed")?
    .rows_affected();
    if affected == 0 {
        anyhow::bail!("schedule {} not found", s.id);
    }
    Ok(())
}

pub async fn delete_schedule(pool: &PgPool, id: Uuid) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM schedules WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete schedule failed")?
        .rows_affected();
    Ok(affected > 0)
}

pub async fn count_schedules_by_status(pool: &PgPool, status: ScheduleStatus) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM schedules WHERE status = $1")
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .context("count schedules by status failed")?;
    Ok(row.try_get("n")?)
}

pub async fn count_schedules(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM schedules")
        .fetch_one(pool)
        .await
        .context("count schedules failed")?;
    Ok(row.try_get("n")?)
}

// ---------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------

fn run_from_row(row: &sqlx::postgres::PgRow) -> Result<Run> {
    Ok(Run {
        id: row.try_get("id")?,
        schedule_id: row.try_get("schedule_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        scheduled_at: row.try_get("scheduled_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        status: RunStatus::parse(row.try_get::<String, _>("status")?.as_str())?,
        attempt_count: row.try_get("attempt_count")?,
        final_status_code: row.try_get("final_status_code")?,
        final_error_type: ErrorType::parse(row.try_get::<String, _>("final_error_type")?.as_str())?,
        final_error_message: row.try_get("final_error_message")?,
    })
}

/// Outcome of attempting to insert a Run: either it was inserted, or an
/// existing Run with the same idempotency_key already won the race.
pub enum InsertRunOutcome {
    Inserted,
    Duplicate,
}

/// Insert a Run, relying on the unique index on `idempotency_key` to make
/// two concurrent inserts of the same key resolve to exactly one winner
/// (§4.1). The loser gets `InsertRunOutcome::Duplicate` rather than a
/// propagated error.
pub async fn insert_run(pool: &PgPool, r: &Run) -> Result<InsertRunOutcome> {
    let result = sqlx::query(
        "INSERT INTO runs (id, schedule_id, idempotency_key, scheduled_at, started_at, completed_at,
         status, attempt_count, final_status_code, final_error_type, final_error_message)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
    )
    .bind(r.id)
    .bind(r.schedule_id)
    .bind(&r.idempotency_key)
    .bind(r.scheduled_at)
    .bind(r.started_at)
    .bind(r.completed_at)
    .bind(r.status.as_str())
    .bind(r.attempt_count)
    .bind(r.final_status_code)
    .bind(r.final_error_type.as_str())
    .bind(&r.final_error_message)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(InsertRunOutcome::Inserted),
        Err(e) if is_unique_violation(&e, "idx_runs_idempotency_key") => Ok(InsertRunOutcome::Duplicate),
        Err(e) => Err(e).context("insert run failed"),
    }
}

pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<Run>> {
    let row = sqlx::query("SELECT * FROM runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get run failed")?;
    row.as_ref().map(run_from_row).transpose()
}

pub async fn get_run_by_idempotency_key(pool: &PgPool, key: &str) -> Result<Option<Run>> {
    let row = sqlx::query("SELECT * FROM runs WHERE idempotency_key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("get run by idempotency key failed")?;
    row.as_ref().map(run_from_row).transpose()
}

pub async fn update_run(pool: &PgPool, r: &Run) -> Result<()> {
    let affected = sqlx::query(
        "UPDATE runs SET started_at=$2, completed_at=$3, status=$4, attempt_count=$5,
         final_status_code=$6, final_error_type=$7, final_error_message=$8 WHERE id=$1",
    )
    .bind(r.id)
    .bind(r.started_at)
    .bind(r.completed_at)
    .bind(r.status.as_str())
    .bind(r.attempt_count)
    .bind(r.final_status_code)
    .bind(r.final_error_type.as_str())
    .bind(&r.final_error_message)
    .execute(pool)
    .await
    .context("update run failed")?
    .rows_affected();
    if affected == 0 {
        anyhow::bail!("run {} not found", r.id);
    }
    Ok(())
}

/// Filters accepted by `GET /runs` (§6).
#[derive(Debug, Default, Clone)]
pub struct RunFilter {
    pub schedule_id: Option<Uuid>,
    pub status: Option<RunStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_runs(pool: &PgPool, filter: &RunFilter) -> Result<Vec<Run>> {
    let rows = sqlx::query(
        "SELECT * FROM runs
         WHERE ($1::uuid IS NULL OR schedule_id = $1)
           AND ($2::text IS NULL OR status = $2)
           AND ($3::timestamptz IS NULL OR scheduled_at >= $3)
           AND ($4::timestamptz IS NULL OR scheduled_at <= $4)
         ORDER BY scheduled_at DESC
         LIMIT $5 OFFSET $6",
    )
    .bind(filter.schedule_id)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.start_time)
    .bind(filter.end_time)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await
    .context("list runs failed")?;
    rows.iter().map(run_from_row).collect()
}

pub async fn count_runs(pool: &PgPool, filter: &RunFilter) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM runs
         WHERE ($1::uuid IS NULL OR schedule_id = $1)
           AND ($2::text IS NULL OR status = $2)
           AND ($3::timestamptz IS NULL OR scheduled_at >= $3)
           AND ($4::timestamptz IS NULL OR scheduled_at <= $4)",
    )
    .bind(filter.schedule_id)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.start_time)
    .bind(filter.end_time)
    .fetch_one(pool)
    .await
    .context("count runs failed")?;
    Ok(row.try_get("n")?)
}

/// Startup recovery step 1 (§4.5): every Run left PENDING/RUNNING across a
/// restart is marked FAILED. Returns the number of rows touched.
pub async fn mark_orphan_runs_failed(pool: &PgPool, now: DateTime<Utc>, message: &str) -> Result<u64> {
    let affected = sqlx::query(
        "UPDATE runs SET status = 'FAILED', completed_at = $1, final_error_message = $2
         WHERE status IN ('PENDING', 'RUNNING')",
    )
    .bind(now)
    .bind(message)
    .execute(pool)
    .await
    .context("mark orphan runs failed")?
    .rows_affected();
    Ok(affected)
}

pub async fn count_runs_by_status_since(pool: &PgPool, status: RunStatus, since: DateTime<Utc>) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM runs WHERE status = $1 AND scheduled_at >= $2")
        .bind(status.as_str())
        .bind(since)
        .fetch_one(pool)
        .await
        .context("count runs by status since failed")?;
    Ok(row.try_get("n")?)
}

pub async fn count_runs_since(pool: &PgPool, since: DateTime<Utc>) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM runs WHERE scheduled_at >= $1")
        .bind(since)
        .fetch_one(pool)
        .await
        .context("count runs since failed")?;
    Ok(row.try_get("n")?)
}

pub async fn avg_latency_ms_since(pool: &PgPool, since: DateTime<Utc>) -> Result<Option<f64>> {
    let row = sqlx::query(
        "SELECT AVG(a.latency_ms) AS avg_ms FROM attempts a
         JOIN runs r ON r.id = a.run_id
         WHERE r.scheduled_at >= $1 AND a.latency_ms IS NOT NULL",
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .context("avg latency since failed")?;
    Ok(row.try_get("avg_ms")?)
}

/// All-time count for `api_scheduler_runs_total{status}` (§6), unlike
/// `count_runs_by_status_since` which backs the windowed gauges.
pub async fn count_runs_by_status_all_time(pool: &PgPool, status: RunStatus) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM runs WHERE status = $1")
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .context("count runs by status all time failed")?;
    Ok(row.try_get("n")?)
}

/// Outcome breakdown for one Schedule's Runs, backing the per-schedule
/// metrics breakdown (§6 `GET /metrics`).
pub struct ScheduleRunOutcomes {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub timeout: i64,
}

pub async fn schedule_run_outcomes(pool: &PgPool, schedule_id: Uuid) -> Result<ScheduleRunOutcomes> {
    let row = sqlx::query(
        "SELECT
             COUNT(*) AS total,
             COUNT(*) FILTER (WHERE status = 'SUCCESS') AS successful,
             COUNT(*) FILTER (WHERE status = 'FAILED') AS failed,
             COUNT(*) FILTER (WHERE status = 'TIMEOUT') AS timeout
         FROM runs WHERE schedule_id = $1",
    )
    .bind(schedule_id)
    .fetch_one(pool)
    .await
    .context("schedule run outcomes failed")?;
    Ok(ScheduleRunOutcomes {
        total: row.try_get("total")?,
        successful: row.try_get("successful")?,
        failed: row.try_get("failed")?,
        timeout: row.try_get("timeout")?,
    })
}

pub async fn avg_latency_ms_for_schedule(pool: &PgPool, schedule_id: Uuid) -> Result<Option<f64>> {
    let row = sqlx::query(
        "SELECT AVG(a.latency_ms) AS avg_ms FROM attempts a
         JOIN runs r ON r.id = a.run_id
         WHERE r.schedule_id = $1 AND a.latency_ms IS NOT NULL",
    )
    .bind(schedule_id)
    .fetch_one(pool)
    .await
    .context("avg latency for schedule failed")?;
    Ok(row.try_get("avg_ms")?)
}

// ---------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------

fn attempt_from_row(row: &sqlx::postgres::PgRow) -> Result<Attempt> {
    Ok(Attempt {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        attempt_number: row.try_get("attempt_number")?,
        request_url: row.try_get("request_url")?,
        request_method: HttpMethod::parse(row.try_get::<String, _>("request_method")?.as_str())?,
        request_headers: row.try_get("request_headers")?,
        request_body: row.try_get("request_body")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        latency_ms: row.try_get("latency_ms")?,
        status_code: row.try_get("status_code")?,
        response_headers: row.try_get("response_headers")?,
        response_body: row.try_get("response_body")?,
        response_size_bytes: row.try_get("response_size_bytes")?,
        error_type: ErrorType::parse(row.try_get::<String, _>("error_type")?.as_str())?,
        error_message: row.try_get("error_message")?,
    })
}

pub async fn insert_attempt(pool: &PgPool, a: &Attempt) -> Result<()> {
    sqlx::query(
        "INSERT INTO attempts (id, run_id, attempt_number, request_url, request_method, request_headers,
         request_body, started_at, completed_at, latency_ms, status_code, response_headers, response_body,
         response_size_bytes, error_type, error_message)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
    )
    .bind(a.id)
    .bind(a.run_id)
    .bind(a.attempt_number)
    .bind(&a.request_url)
    .bind(a.request_method.as_str())
    .bind(&a.request_headers)
    .bind(&a.request_body)
    .bind(a.started_at)
    .bind(a.completed_at)
    .bind(a.latency_ms)
    .bind(a.status_code)
    .bind(&a.response_headers)
    .bind(&a.response_body)
    .bind(a.response_size_bytes)
    .bind(a.error_type.as_str())
    .bind(&a.error_message)
    .execute(pool)
    .await
    .context("insert attempt failed")?;
    Ok(())
}

pub async fn list_attempts_for_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<Attempt>> {
    let rows = sqlx::query("SELECT * FROM attempts WHERE run_id = $1 ORDER BY attempt_number ASC")
        .bind(run_id)
        .fetch_all(pool)
        .await
        .context("list attempts for run failed")?;
    rows.iter().map(attempt_from_row).collect()
}

/// All-time count of Attempts by error kind, backing
/// `api_scheduler_errors_total{type}` (§6). `ErrorType::None` attempts are
/// successes, not errors, and are left for the caller to skip.
pub async fn count_attempts_by_error_type(pool: &PgPool, error_type: ErrorType) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM attempts WHERE error_type = $1")
        .bind(error_type.as_str())
        .fetch_one(pool)
        .await
        .context("count attempts by error type failed")?;
    Ok(row.try_get("n")?)
}
