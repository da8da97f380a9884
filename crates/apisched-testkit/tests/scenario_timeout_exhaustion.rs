//! §8 scenario 4: a Target that never responds within the configured
//! timeout exhausts every attempt with error kind TIMEOUT and the Run
//! lands on TIMEOUT rather than FAILED.

mod common;

use apisched_domain::{ErrorType, RunStatus};
use apisched_testkit::ScriptedResponse;
use std::time::Duration;

#[tokio::test]
async fn timeout_exhaustion_lands_on_timeout_status() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else { return Ok(()) };
    // Every call hangs well past the Target's configured timeout.
    let target_server =
        apisched_testkit::MockTarget::start(vec![ScriptedResponse::hangs_for(Duration::from_secs(2))]).await?;

    let target = common::insert_test_target(&pool, &target_server.url("/slow")).await?;
    let coordinator = common::test_coordinator(pool.clone());

    let schedule = common::interval_schedule(target.id, 60, Some(1));
    let schedule = coordinator.add_schedule(schedule).await?;
    coordinator.on_fire(schedule.id).await;

    let runs = apisched_db::list_runs(&pool, &common::all_runs_filter(schedule.id)).await?;
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Timeout);
    assert_eq!(run.attempt_count, 3);

    let attempts = apisched_db::list_attempts_for_run(&pool, run.id).await?;
    assert!(attempts.iter().all(|a| a.error_type == ErrorType::Timeout));

    Ok(())
}
