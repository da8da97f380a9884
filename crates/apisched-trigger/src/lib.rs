//! Computes next-fire times for interval/cron schedules and fires due
//! jobs, enforcing non-overlap (`max_instances=1`) and carrying the
//! misfire-grace tolerance named in §4.4: a late fire still executes, the
//! Engine never independently drops it.

mod engine;
mod next_fire;

pub use engine::{TriggerEngine, TriggerKind};
pub use next_fire::{next_cron_fire, next_interval_fire, parse_five_field_cron};
