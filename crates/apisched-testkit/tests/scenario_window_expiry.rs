//! §8 scenario 5: a Schedule whose window has already elapsed is expired
//! on its next fire attempt instead of producing a Run.

mod common;

use apisched_domain::ScheduleStatus;
use apisched_testkit::ScriptedResponse;
use chrono::Utc;

#[tokio::test]
async fn schedule_past_its_window_expires_without_firing() -> anyhow::Result<()> {
    let Some(pool) = common::test_pool().await? else { return Ok(()) };
    let target_server = apisched_testkit::MockTarget::start(vec![ScriptedResponse::ok("ok")]).await?;

    let target = common::insert_test_target(&pool, &target_server.url("/ok")).await?;
    let coordinator = common::test_coordinator(pool.clone());

    let mut schedule = common::interval_schedule(target.id, 10, None);
    // Window already closed five seconds ago.
    schedule.started_at = Utc::now() - chrono::Duration::seconds(10);
    schedule.duration_seconds = Some(5);
    schedule.expires_at = Some(schedule.started_at + chrono::Duration::seconds(5));
    let schedule = coordinator.add_schedule(schedule).await?;

    coordinator.on_fire(schedule.id).await;

    let final_schedule = apisched_db::get_schedule(&pool, schedule.id).await?.unwrap();
    assert_eq!(final_schedule.status, ScheduleStatus::Expired);
    assert_eq!(final_schedule.run_count, 0);
    assert!(target_server.call_count() == 0, "the Target must never be called once the window has closed");

    Ok(())
}
