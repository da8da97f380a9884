//! §8 scenario 1: an INTERVAL schedule with max_runs=3 expires itself
//! after its third successful fire, with exactly three SUCCESS Runs.

mod common;

use apisched_domain::{RunStatus, ScheduleStatus};

#[tokio::test]
async fn interval_schedule_expires_after_max_runs() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else { return Ok(()) };
    let target_server = apisched_testkit::MockTarget::start(vec![apisched_testkit::ScriptedResponse::ok("ok")]).await?;

    let target = common::insert_test_target(&pool, &target_server.url("/ok")).await?;
    let coordinator = common::test_coordinator(pool.clone());

    let schedule = common::interval_schedule(target.id, 1, Some(3));
    let schedule = coordinator.add_schedule(schedule).await?;

    for _ in 0..4 {
        coordinator.on_fire(schedule.id).await;
    }

    let final_schedule = apisched_db::get_schedule(&pool, schedule.id).await?.unwrap();
    assert_eq!(final_schedule.status, ScheduleStatus::Expired);
    assert_eq!(final_schedule.run_count, 3);

    let filter = common::all_runs_filter(schedule.id);
    let runs = apisched_db::list_runs(&pool, &filter).await?;
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));

    Ok(())
}
