//! §8 scenario 7: two Runs racing to insert under the same idempotency
//! key resolve to exactly one stored Run — the second is reported as a
//! duplicate rather than erroring or creating a second row. This is the
//! invariant the fire handler's dedup check (§4.5 step 4) depends on;
//! wall-clock-second collisions aren't driven here directly since the
//! fire handler computes its key from the current second, which a test
//! can't pin without mocking time.

mod common;

use apisched_domain::{ErrorType, Run, RunStatus};
use chrono::Utc;
use uuid::Uuid;

#[tokio::test]
async fn duplicate_idempotency_key_is_reported_not_inserted() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else { return Ok(()) };
    let target_server = apisched_testkit::MockTarget::start(vec![apisched_testkit::ScriptedResponse::ok("ok")]).await?;
    let target = common::insert_test_target(&pool, &target_server.url("/ok")).await?;
    let coordinator = common::test_coordinator(pool.clone());
    let schedule = common::interval_schedule(target.id, 60, None);
    let schedule = coordinator.add_schedule(schedule).await?;

    let key = format!("{}:fixed-second", schedule.id);
    let now = Utc::now();
    let make_run = || Run {
        id: Uuid::new_v4(),
        schedule_id: schedule.id,
        idempotency_key: key.clone(),
        scheduled_at: now,
        started_at: None,
        completed_at: None,
        status: RunStatus::Pending,
        attempt_count: 0,
        final_status_code: None,
        final_error_type: ErrorType::None,
        final_error_message: None,
    };

    let first = apisched_db::insert_run(&pool, &make_run()).await?;
    let second = apisched_db::insert_run(&pool, &make_run()).await?;

    assert!(matches!(first, apisched_db::InsertRunOutcome::Inserted));
    assert!(matches!(second, apisched_db::InsertRunOutcome::Duplicate));

    let runs = apisched_db::list_runs(&pool, &common::all_runs_filter(schedule.id)).await?;
    assert_eq!(runs.len(), 1);

    Ok(())
}
