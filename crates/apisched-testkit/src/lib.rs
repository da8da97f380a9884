//! Test-only fakes: an in-process HTTP target server that serves a
//! scripted sequence of responses, for scenario tests exercising the
//! full fire → execute → persist path against a real Postgres.
//!
//! Mirrors the teacher's `mqk-testkit` shape (`FakeBroker`, a scripted
//! in-process double) generalized to this domain's collaborator, an
//! HTTP target, rather than a broker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Router;

/// One scripted response: status code, body, and an optional delay
/// before responding (used to simulate a hung Target for the timeout
/// scenario).
#[derive(Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
    pub delay: Option<std::time::Duration>,
}

impl ScriptedResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        ScriptedResponse { status: 200, body: body.into(), delay: None }
    }
    pub fn status(status: u16) -> Self {
        ScriptedResponse { status, body: String::new(), delay: None }
    }
    pub fn hangs_for(delay: std::time::Duration) -> Self {
        ScriptedResponse { status: 200, body: String::new(), delay: Some(delay) }
    }
}

struct ScriptState {
    script: Vec<ScriptedResponse>,
    calls: AtomicUsize,
}

/// A running mock Target. Serves `script[call_index]`, repeating the
/// last entry once the script is exhausted, so a max_retries-sized burst
/// against a two-entry script still gets a sane final response.
pub struct MockTarget {
    pub base_url: String,
    state: Arc<ScriptState>,
}

impl MockTarget {
    pub async fn start(script: Vec<ScriptedResponse>) -> anyhow::Result<Self> {
        let state = Arc::new(ScriptState { script, calls: AtomicUsize::new(0) });
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(MockTarget { base_url: format!("http://{addr}"), state })
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn handle(State(state): State<Arc<ScriptState>>) -> (StatusCode, String) {
    let index = state.calls.fetch_add(1, Ordering::SeqCst);
    let response = state
        .script
        .get(index)
        .or_else(|| state.script.last())
        .cloned()
        .unwrap_or_else(|| ScriptedResponse::ok(""));

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    (status, response.body)
}

/// Skips a scenario test with a diagnostic rather than failing the suite
/// when no database is configured for local/offline runs, matching the
/// teacher's scenario test convention.
pub fn require_database_url() -> Option<String> {
    match std::env::var(apisched_db::ENV_DB_URL) {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("SKIP: {} not set", apisched_db::ENV_DB_URL);
            None
        }
    }
}
