//! Shared scenario-test scaffolding: DB pool bootstrap, a minimal
//! Coordinator wired to an Executor with fast retry timings, and builders
//! for the Target/Schedule fixtures every scenario starts from.

use std::sync::Arc;

use apisched_config::Settings;
use apisched_coordinator::Coordinator;
use apisched_domain::{HttpMethod, Schedule, ScheduleStatus, ScheduleType, Target};
use apisched_executor::Executor;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// Connects and migrates against `APISCHED_DATABASE_URL`, or returns
/// `None` (after printing a skip notice) when it isn't set — the same
/// opt-in-to-integration-tests convention the teacher's scenario suite
/// uses for Postgres-backed tests.
pub async fn test_pool() -> anyhow::Result<Option<PgPool>> {
    let Some(url) = apisched_testkit::require_database_url() else { return Ok(None) };
    let pool = apisched_db::connect(&url).await?;
    apisched_db::migrate(&pool).await?;
    Ok(Some(pool))
}

/// Fast, deterministic-for-tests settings: sub-second retry delay so
/// retry-sequence scenarios don't need multi-second sleeps to observe
/// backoff in action.
pub fn test_settings() -> Settings {
    Settings {
        database_url: String::new(),
        bind_addr: "127.0.0.1:0".to_string(),
        default_timeout_seconds: 5.0,
        max_timeout_seconds: 30.0,
        max_retries: 3,
        retry_delay_seconds: 0.02,
        verify_ssl: false,
        max_concurrent_jobs: 10,
        misfire_grace_seconds: 60,
        api_prefix: "/api/v1".to_string(),
        scheduler_tz: "UTC".to_string(),
    }
}

pub fn test_coordinator(pool: PgPool) -> Arc<Coordinator> {
    let settings = test_settings();
    let executor = Arc::new(Executor::new(settings.verify_ssl, settings.max_retries as u32, settings.retry_delay_seconds));
    Coordinator::new(pool, executor, settings)
}

pub async fn insert_test_target(pool: &PgPool, url: &str) -> anyhow::Result<Target> {
    let now = Utc::now();
    let target = Target {
        id: Uuid::new_v4(),
        name: "scenario target".to_string(),
        url: url.to_string(),
        method: HttpMethod::Get,
        headers: serde_json::json!({}),
        body_template: None,
        timeout_seconds: 0.3,
        created_at: now,
        updated_at: now,
    };
    apisched_db::insert_target(pool, &target).await?;
    Ok(target)
}

pub fn interval_schedule(target_id: Uuid, interval_seconds: i64, max_runs: Option<i64>) -> Schedule {
    let now = Utc::now();
    Schedule {
        id: Uuid::new_v4(),
        name: "scenario schedule".to_string(),
        target_id,
        schedule_type: ScheduleType::Interval,
        interval_seconds: Some(interval_seconds),
        cron_expression: None,
        status: ScheduleStatus::Active,
        started_at: now,
        duration_seconds: None,
        expires_at: None,
        max_runs,
        run_count: 0,
        next_run_at: None,
        last_run_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn all_runs_filter(schedule_id: Uuid) -> apisched_db::RunFilter {
    apisched_db::RunFilter {
        schedule_id: Some(schedule_id),
        status: None,
        start_time: None,
        end_time: None,
        limit: 1000,
        offset: 0,
    }
}
