//! In-memory registry of triggers keyed by schedule id. Durable state
//! (`next_run_at` etc.) lives in the Store and is rebuilt on startup; this
//! Engine only decides, moment to moment, which schedules are due.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::next_fire::{next_cron_fire, next_interval_fire};

/// The cadence a registered trigger fires on.
#[derive(Debug, Clone)]
pub enum TriggerKind {
    Interval { interval_seconds: i64 },
    Cron { expression: String },
}

impl TriggerKind {
    pub fn next_after(&self, tz: &Tz, after: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        match self {
            TriggerKind::Interval { interval_seconds } => Ok(next_interval_fire(after, *interval_seconds)),
            TriggerKind::Cron { expression } => next_cron_fire(expression, tz, after),
        }
    }
}

struct TriggerEntry {
    kind: TriggerKind,
    tz: Tz,
    next_run_at: DateTime<Utc>,
    /// Enforces `max_instances=1` at the Engine layer (§4.4/§5); the
    /// Coordinator holds a second, independent token over the same
    /// invariant.
    in_flight: Arc<AtomicBool>,
}

type FireCallback = Arc<dyn Fn(Uuid) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Fires registered triggers as they come due. `run` drives the tick loop
/// and should be spawned once at process startup; it returns only when
/// `stop` is called (graceful shutdown, §5).
pub struct TriggerEngine {
    entries: RwLock<HashMap<Uuid, TriggerEntry>>,
    stopped: Arc<AtomicBool>,
    /// Handles for spawned fire-callback tasks, joined during graceful
    /// shutdown so the process doesn't exit out from under one (§5).
    in_flight_tasks: Mutex<JoinSet<()>>,
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerEngine {
    pub fn new() -> Self {
        TriggerEngine {
            entries: RwLock::new(HashMap::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            in_flight_tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub async fn register(&self, schedule_id: Uuid, kind: TriggerKind, tz: Tz, next_run_at: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            schedule_id,
            TriggerEntry {
                kind,
                tz,
                next_run_at,
                in_flight: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    pub async fn deregister(&self, schedule_id: Uuid) {
        self.entries.write().await.remove(&schedule_id);
    }

    pub async fn is_registered(&self, schedule_id: Uuid) -> bool {
        self.entries.read().await.contains_key(&schedule_id)
    }

    /// Stop accepting new fires. Callbacks already in flight keep running;
    /// call `join_in_flight` afterward to wait for them (graceful
    /// shutdown, §5).
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Waits for every fire callback spawned before `stop()` to finish.
    /// Safe to call even if none are in flight.
    pub async fn join_in_flight(&self) {
        let mut tasks = self.in_flight_tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    /// Ticks once per second, firing any schedule whose `next_run_at` has
    /// passed and which isn't already in flight. A schedule skipped for
    /// being in flight is simply left registered; the next tick re-checks
    /// it, so one fire is coalesced per wake rather than queued.
    pub async fn run(&self, callback: FireCallback) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }

            let now = Utc::now();
            let due: Vec<(Uuid, Arc<AtomicBool>)> = {
                let entries = self.entries.read().await;
                entries
                    .iter()
                    .filter(|(_, e)| e.next_run_at <= now)
                    .map(|(id, e)| (*id, e.in_flight.clone()))
                    .collect()
            };

            for (schedule_id, in_flight) in due {
                if in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    info!(%schedule_id, "skipping fire: previous firing still in flight (max_instances=1)");
                    continue;
                }

                let callback = callback.clone();
                self.in_flight_tasks.lock().await.spawn(async move {
                    callback(schedule_id).await;
                    in_flight.store(false, Ordering::SeqCst);
                });
            }
        }
    }

    /// Called by the Coordinator after a fire completes, to advance the
    /// in-memory `next_run_at` so the tick loop stops re-firing it.
    pub async fn advance(&self, schedule_id: Uuid, next_run_at: DateTime<Utc>) {
        if let Some(entry) = self.entries.write().await.get_mut(&schedule_id) {
            entry.next_run_at = next_run_at;
        } else {
            warn!(%schedule_id, "advance called for a trigger no longer registered");
        }
    }
}
