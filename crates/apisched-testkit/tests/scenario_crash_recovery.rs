//! §8 scenario 6: a Run left RUNNING across a restart is marked FAILED
//! by startup recovery, with a message naming the restart as the cause.

mod common;

use apisched_domain::{ErrorType, Run, RunStatus};
use chrono::Utc;
use uuid::Uuid;

#[tokio::test]
async fn orphaned_running_run_is_failed_on_recovery() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else { return Ok(()) };
    let target_server = apisched_testkit::MockTarget::start(vec![apisched_testkit::ScriptedResponse::ok("ok")]).await?;
    let target = common::insert_test_target(&pool, &target_server.url("/ok")).await?;
    let coordinator = common::test_coordinator(pool.clone());

    let schedule = common::interval_schedule(target.id, 60, None);
    let schedule = coordinator.add_schedule(schedule).await?;

    let now = Utc::now();
    let orphan = Run {
        id: Uuid::new_v4(),
        schedule_id: schedule.id,
        idempotency_key: format!("{}:orphan", schedule.id),
        scheduled_at: now,
        started_at: Some(now),
        completed_at: None,
        status: RunStatus::Running,
        attempt_count: 1,
        final_status_code: None,
        final_error_type: ErrorType::None,
        final_error_message: None,
    };
    assert!(matches!(
        apisched_db::insert_run(&pool, &orphan).await?,
        apisched_db::InsertRunOutcome::Inserted
    ));

    // Simulate the process restarting.
    coordinator.recover().await?;

    let recovered = apisched_db::get_run(&pool, orphan.id).await?.unwrap();
    assert_eq!(recovered.status, RunStatus::Failed);
    assert!(recovered
        .final_error_message
        .as_deref()
        .unwrap_or("")
        .contains("Server restarted"));

    Ok(())
}
