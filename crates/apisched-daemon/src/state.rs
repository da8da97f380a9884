//! Shared application state handed to every route handler.

use std::sync::Arc;

use apisched_config::Settings;
use apisched_coordinator::Coordinator;
use sqlx::PgPool;

pub struct AppState {
    pub pool: PgPool,
    pub coordinator: Arc<Coordinator>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(pool: PgPool, coordinator: Arc<Coordinator>, settings: Settings) -> Arc<Self> {
        Arc::new(AppState { pool, coordinator, settings })
    }
}
