//! §8 scenario 2: a Target that always 404s fails the Run on the first
//! Attempt — CLIENT_ERROR is not retried.

mod common;

use apisched_domain::{ErrorType, RunStatus};
use apisched_testkit::ScriptedResponse;

#[tokio::test]
async fn non_retryable_4xx_fails_after_one_attempt() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else { return Ok(()) };
    let target_server = apisched_testkit::MockTarget::start(vec![ScriptedResponse::status(404)]).await?;

    let target = common::insert_test_target(&pool, &target_server.url("/missing")).await?;
    let coordinator = common::test_coordinator(pool.clone());

    let schedule = common::interval_schedule(target.id, 60, Some(1));
    let schedule = coordinator.add_schedule(schedule).await?;
    coordinator.on_fire(schedule.id).await;

    let runs = apisched_db::list_runs(&pool, &common::all_runs_filter(schedule.id)).await?;
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.attempt_count, 1);
    assert_eq!(run.final_status_code, Some(404));
    assert_eq!(run.final_error_type, ErrorType::ClientError);

    let attempts = apisched_db::list_attempts_for_run(&pool, run.id).await?;
    assert_eq!(attempts.len(), 1);

    Ok(())
}
