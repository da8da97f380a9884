//! Lifecycle of Schedules: add/pause/resume/delete, the fire handler that
//! turns a due Trigger into a Run, the periodic window sweeper, and
//! startup crash recovery (§4.5).

mod sweeper;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use apisched_config::Settings;
use apisched_db::{InsertRunOutcome, RunFilter};
use apisched_domain::{ErrorType, Run, RunStatus, Schedule, ScheduleStatus, ScheduleType};
use apisched_executor::Executor;
use apisched_trigger::{TriggerEngine, TriggerKind};
use chrono::Utc;
use chrono_tz::Tz;
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

pub use apisched_db::RunFilter as CoordinatorRunFilter;

/// Startup recovery's message for Runs left PENDING/RUNNING across a
/// restart (§4.5 step 1, §8 scenario 6).
pub const ORPHAN_RUN_MESSAGE: &str = "Server restarted while run was in progress";

pub struct Coordinator {
    pool: PgPool,
    engine: Arc<TriggerEngine>,
    executor: Arc<Executor>,
    settings: Settings,
    tokens: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(pool: PgPool, executor: Arc<Executor>, settings: Settings) -> Arc<Self> {
        Arc::new(Coordinator {
            pool,
            engine: Arc::new(TriggerEngine::new()),
            executor,
            settings,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    pub fn engine(&self) -> Arc<TriggerEngine> {
        self.engine.clone()
    }

    fn scheduler_tz(&self) -> Tz {
        Tz::from_str(&self.settings.scheduler_tz).unwrap_or(chrono_tz::UTC)
    }

    async fn token_for(&self, schedule_id: Uuid) -> Arc<Mutex<()>> {
        let mut tokens = self.tokens.write().await;
        tokens.entry(schedule_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn trigger_kind(schedule: &Schedule) -> Result<TriggerKind> {
        match schedule.schedule_type {
            ScheduleType::Interval => {
                let seconds = schedule
                    .interval_seconds
                    .context("interval schedule missing interval_seconds")?;
                Ok(TriggerKind::Interval { interval_seconds: seconds })
            }
            ScheduleType::Cron => {
                let expr = schedule
                    .cron_expression
                    .clone()
                    .context("cron schedule missing cron_expression")?;
                Ok(TriggerKind::Cron { expression: expr })
            }
        }
    }

    /// §4.5 `add_schedule`: fills in derived fields, persists, and
    /// registers the trigger.
    pub async fn add_schedule(&self, mut schedule: Schedule) -> Result<Schedule> {
        let now = Utc::now();
        if schedule.started_at > now {
            // started_at explicitly in the future is honored as-is; only
            // an unset value defaults to now. Callers signal "unset" by
            // passing `now` themselves, so there is nothing to adjust
            // here beyond the derivations below.
        }

        if let Some(duration) = schedule.duration_seconds {
            if schedule.expires_at.is_none() {
                schedule.expires_at = Some(schedule.started_at + chrono::Duration::seconds(duration));
            }
        }

        let kind = Self::trigger_kind(&schedule)?;
        let tz = self.scheduler_tz();
        schedule.next_run_at = Some(kind.next_after(&tz, now)?);

        apisched_db::insert_schedule(&self.pool, &schedule).await?;
        self.engine
            .register(schedule.id, kind, tz, schedule.next_run_at.unwrap())
            .await;

        Ok(schedule)
    }

    /// §4.5 `pause_schedule`.
    pub async fn pause_schedule(&self, schedule_id: Uuid) -> Result<Schedule> {
        let mut schedule = apisched_db::get_schedule(&self.pool, schedule_id)
            .await?
            .context("schedule not found")?;

        self.engine.deregister(schedule_id).await;
        schedule.status = ScheduleStatus::Paused;
        schedule.next_run_at = None;
        schedule.updated_at = Utc::now();
        apisched_db::update_schedule(&self.pool, &schedule).await?;
        Ok(schedule)
    }

    /// §4.5 `resume_schedule`. Rejects (by expiring instead) a Schedule
    /// that is already past its window or run cap.
    pub async fn resume_schedule(&self, schedule_id: Uuid) -> Result<Schedule> {
        let mut schedule = apisched_db::get_schedule(&self.pool, schedule_id)
            .await?
            .context("schedule not found")?;

        let now = Utc::now();
        let expired_by_window = schedule.expires_at.map(|e| now >= e).unwrap_or(false);
        let expired_by_cap = schedule
            .max_runs
            .map(|cap| schedule.run_count >= cap)
            .unwrap_or(false);

        if expired_by_window || expired_by_cap {
            schedule.status = ScheduleStatus::Expired;
            schedule.next_run_at = None;
            schedule.updated_at = now;
            apisched_db::update_schedule(&self.pool, &schedule).await?;
            return Ok(schedule);
        }

        let kind = Self::trigger_kind(&schedule)?;
        let tz = self.scheduler_tz();
        schedule.status = ScheduleStatus::Active;
        schedule.next_run_at = Some(kind.next_after(&tz, now)?);
        schedule.updated_at = now;
        apisched_db::update_schedule(&self.pool, &schedule).await?;
        self.engine
            .register(schedule.id, kind, tz, schedule.next_run_at.unwrap())
            .await;
        Ok(schedule)
    }

    /// §4.5 `delete_schedule`. The Store row deletion cascades to Runs and
    /// Attempts via foreign-key constraints.
    pub async fn delete_schedule(&self, schedule_id: Uuid) -> Result<bool> {
        self.engine.deregister(schedule_id).await;
        apisched_db::delete_schedule(&self.pool, schedule_id).await
    }

    /// §4.5 fire handler. Intended as the Engine's fire callback.
    pub async fn on_fire(&self, schedule_id: Uuid) {
        let token = self.token_for(schedule_id).await;
        let _guard = match token.try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!(%schedule_id, "fire skipped: per-process exclusion token already held");
                return;
            }
        };

        if let Err(e) = self.on_fire_inner(schedule_id).await {
            warn!(%schedule_id, error = %e, "fire handler failed");
        }
    }

    async fn on_fire_inner(&self, schedule_id: Uuid) -> Result<()> {
        let (mut schedule, target) = match apisched_db::get_schedule_with_target(&self.pool, schedule_id).await? {
            Some(pair) => pair,
            None => return Ok(()),
        };
        if schedule.status != ScheduleStatus::Active {
            return Ok(());
        }

        let now = Utc::now();

        if let Some(expires_at) = schedule.expires_at {
            if now >= expires_at {
                return self.expire_schedule(schedule).await;
            }
        }
        if let Some(max_runs) = schedule.max_runs {
            if schedule.run_count >= max_runs {
                return self.expire_schedule(schedule).await;
            }
        }

        let scheduled_at = now;
        let idempotency_key = format!("{schedule_id}:{}", scheduled_at.format("%Y%m%d%H%M%S"));

        if apisched_db::get_run_by_idempotency_key(&self.pool, &idempotency_key)
            .await?
            .is_some()
        {
            info!(%schedule_id, idempotency_key, "duplicate fire for this wall-second, skipping");
            return Ok(());
        }

        let run = Run {
            id: Uuid::new_v4(),
            schedule_id,
            idempotency_key: idempotency_key.clone(),
            scheduled_at,
            started_at: None,
            completed_at: None,
            status: RunStatus::Pending,
            attempt_count: 0,
            final_status_code: None,
            final_error_type: ErrorType::None,
            final_error_message: None,
        };

        let run = match apisched_db::insert_run(&self.pool, &run).await? {
            InsertRunOutcome::Inserted => run,
            InsertRunOutcome::Duplicate => {
                info!(%schedule_id, idempotency_key, "duplicate-key race on run insert, treating as satisfied");
                return Ok(());
            }
        };

        self.executor.execute_run(&self.pool, run, &target).await?;

        schedule.run_count += 1;
        schedule.last_run_at = Some(now);
        let kind = Self::trigger_kind(&schedule)?;
        let tz = self.scheduler_tz();
        schedule.next_run_at = Some(kind.next_after(&tz, now)?);
        schedule.updated_at = now;

        if schedule
            .max_runs
            .map(|cap| schedule.run_count >= cap)
            .unwrap_or(false)
        {
            return self.expire_schedule(schedule).await;
        }

        apisched_db::update_schedule(&self.pool, &schedule).await?;
        self.engine.advance(schedule_id, schedule.next_run_at.unwrap()).await;
        Ok(())
    }

    async fn expire_schedule(&self, mut schedule: Schedule) -> Result<()> {
        schedule.status = ScheduleStatus::Expired;
        schedule.next_run_at = None;
        schedule.updated_at = Utc::now();
        self.engine.deregister(schedule.id).await;
        apisched_db::update_schedule(&self.pool, &schedule).await?;
        Ok(())
    }

    /// Startup recovery (§4.5): fail orphaned Runs, then either expire or
    /// re-register every ACTIVE Schedule.
    pub async fn recover(&self) -> Result<()> {
        let now = Utc::now();
        let orphaned = apisched_db::mark_orphan_runs_failed(&self.pool, now, ORPHAN_RUN_MESSAGE).await?;
        if orphaned > 0 {
            info!(orphaned, "marked orphaned runs as failed on startup");
        }

        let active = apisched_db::list_schedules_by_status(&self.pool, ScheduleStatus::Active).await?;
        let tz = self.scheduler_tz();
        for mut schedule in active {
            let expired_by_window = schedule.expires_at.map(|e| now >= e).unwrap_or(false);
            let expired_by_cap = schedule
                .max_runs
                .map(|cap| schedule.run_count >= cap)
                .unwrap_or(false);

            if expired_by_window || expired_by_cap {
                schedule.status = ScheduleStatus::Expired;
                schedule.next_run_at = None;
                schedule.updated_at = now;
                apisched_db::update_schedule(&self.pool, &schedule).await?;
                continue;
            }

            let kind = match Self::trigger_kind(&schedule) {
                Ok(k) => k,
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "skipping malformed schedule on recovery");
                    continue;
                }
            };
            let next_run_at = schedule.next_run_at.unwrap_or(now);
            self.engine.register(schedule.id, kind, tz, next_run_at).await;
        }

        Ok(())
    }

    /// Runs the 60-second window sweeper loop forever; spawn once at
    /// startup. Failures are logged and never bring the process down
    /// (§7).
    pub async fn run_sweeper(self: Arc<Self>) {
        sweeper::run(self).await;
    }

    pub(crate) async fn sweep_once(&self) -> Result<usize> {
        let now = Utc::now();
        let expired = apisched_db::find_expired_active_schedules(&self.pool, now).await?;
        let count = expired.len();
        for schedule in expired {
            self.expire_schedule(schedule).await?;
        }
        Ok(count)
    }

    pub async fn list_runs(&self, filter: &RunFilter) -> Result<(Vec<Run>, i64)> {
        let runs = apisched_db::list_runs(&self.pool, filter).await?;
        let total = apisched_db::count_runs(&self.pool, filter).await?;
        Ok((runs, total))
    }
}
