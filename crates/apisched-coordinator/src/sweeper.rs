//! Periodic window sweeper (§4.5): every 60 seconds, expire Schedules
//! whose `expires_at` has passed but that the fire handler hasn't touched
//! because they simply stopped being due (e.g. a long interval past a
//! short window).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::Coordinator;

pub async fn run(coordinator: Arc<Coordinator>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;
        match coordinator.sweep_once().await {
            Ok(0) => {}
            Ok(n) => info!(expired = n, "window sweep expired schedules past their window"),
            Err(e) => warn!(error = %e, "window sweep failed"),
        }
    }
}
