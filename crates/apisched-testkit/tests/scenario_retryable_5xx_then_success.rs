//! §8 scenario 3: 503, 503, 200 — two retried SERVER_ERROR attempts then
//! a successful third, ending the Run at SUCCESS with three Attempts.

mod common;

use apisched_domain::RunStatus;
use apisched_testkit::ScriptedResponse;

#[tokio::test]
async fn retries_through_server_errors_to_success() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else { return Ok(()) };
    let target_server = apisched_testkit::MockTarget::start(vec![
        ScriptedResponse::status(503),
        ScriptedResponse::status(503),
        ScriptedResponse::ok("ok"),
    ])
    .await?;

    let target = common::insert_test_target(&pool, &target_server.url("/flaky")).await?;
    let coordinator = common::test_coordinator(pool.clone());

    let schedule = common::interval_schedule(target.id, 60, Some(1));
    let schedule = coordinator.add_schedule(schedule).await?;
    coordinator.on_fire(schedule.id).await;

    let runs = apisched_db::list_runs(&pool, &common::all_runs_filter(schedule.id)).await?;
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.attempt_count, 3);

    let attempts = apisched_db::list_attempts_for_run(&pool, run.id).await?;
    let status_codes: Vec<Option<i32>> = attempts.iter().map(|a| a.status_code).collect();
    assert_eq!(status_codes, vec![Some(503), Some(503), Some(200)]);
    assert_eq!(
        attempts.iter().map(|a| a.attempt_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    Ok(())
}
