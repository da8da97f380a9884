//! Performs one HTTP attempt and applies the retry policy across the
//! attempts of a Run (§4.3). Given a Run in PENDING status and its
//! Target, `Executor::execute_run` drives it to a terminal state,
//! persisting one Attempt per try.

mod backoff;
mod client;
mod template;
mod truncate;

use std::time::Duration;

use anyhow::{Context, Result};
use apisched_classifier::{classify_exception, classify_status};
use apisched_db::{insert_attempt, update_run};
use apisched_domain::{Attempt, ErrorType, HttpMethod, Run, RunStatus, Target};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

pub use backoff::calculate_backoff;
pub use client::PooledClient;
pub use template::prepare_body;
pub use truncate::{truncate_response_body, MAX_RESPONSE_BODY_SIZE};

pub struct Executor {
    client: PooledClient,
    max_retries: u32,
    base_retry_delay: f64,
}

impl Executor {
    pub fn new(verify_ssl: bool, max_retries: u32, base_retry_delay: f64) -> Self {
        Executor {
            client: PooledClient::new(verify_ssl, Duration::from_secs(30)),
            max_retries,
            base_retry_delay,
        }
    }

    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }

    /// Drives `run` (already PENDING) through attempts against `target`
    /// until a terminal state is reached, persisting attempts and the
    /// Run's progress as it goes. Returns the final Run.
    pub async fn execute_run(&self, pool: &PgPool, mut run: Run, target: &Target) -> Result<Run> {
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        update_run(pool, &run).await.context("mark run running")?;

        let mut last_attempt: Option<Attempt> = None;

        for attempt_num in 1..=self.max_retries {
            let attempt = self.execute_attempt(target, run.id, attempt_num as i32).await;
            insert_attempt(pool, &attempt).await.context("persist attempt")?;
            run.attempt_count = attempt_num as i32;

            if attempt.error_type == ErrorType::None {
                run.status = RunStatus::Success;
                run.final_status_code = attempt.status_code;
                run.final_error_type = ErrorType::None;
                run.final_error_message = None;
                last_attempt = Some(attempt);
                break;
            }

            if attempt.error_type == ErrorType::ClientError {
                run.status = RunStatus::Failed;
                run.final_status_code = attempt.status_code;
                run.final_error_type = attempt.error_type;
                run.final_error_message = attempt.error_message.clone();
                last_attempt = Some(attempt);
                break;
            }

            if attempt_num < self.max_retries {
                let delay = calculate_backoff(attempt_num, self.base_retry_delay);
                info!(
                    run_id = %run.id,
                    attempt_num,
                    error_type = attempt.error_type.as_str(),
                    delay_seconds = delay,
                    "attempt failed, retrying with exponential backoff",
                );
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
            last_attempt = Some(attempt);
        }

        if run.status == RunStatus::Running {
            if let Some(attempt) = &last_attempt {
                run.status = if attempt.error_type == ErrorType::Timeout {
                    RunStatus::Timeout
                } else {
                    RunStatus::Failed
                };
                run.final_status_code = attempt.status_code;
                run.final_error_type = attempt.error_type;
                run.final_error_message = attempt.error_message.clone();
            } else {
                run.status = RunStatus::Failed;
            }
        }

        run.completed_at = Some(Utc::now());
        update_run(pool, &run).await.context("finalize run")?;
        Ok(run)
    }

    async fn execute_attempt(&self, target: &Target, run_id: Uuid, attempt_number: i32) -> Attempt {
        let started_at = Utc::now();
        let request_body = prepare_body(target.body_template.as_deref(), started_at);

        let mut attempt = Attempt {
            id: Uuid::new_v4(),
            run_id,
            attempt_number,
            request_url: target.url.clone(),
            request_method: target.method,
            request_headers: target.headers.clone(),
            request_body: request_body.clone(),
            started_at,
            completed_at: None,
            latency_ms: None,
            status_code: None,
            response_headers: None,
            response_body: None,
            response_size_bytes: None,
            error_type: ErrorType::Unknown,
            error_message: None,
        };

        match self.send(target, request_body).await {
            Ok(outcome) => {
                let latency_ms = (outcome.completed_at - started_at).num_milliseconds();
                attempt.completed_at = Some(outcome.completed_at);
                attempt.latency_ms = Some(latency_ms);
                attempt.status_code = Some(outcome.status_code);
                attempt.response_headers = Some(outcome.response_headers);
                attempt.response_body = Some(outcome.response_body);
                attempt.response_size_bytes = Some(outcome.response_size_bytes);

                if (200..400).contains(&outcome.status_code) {
                    attempt.error_type = ErrorType::None;
                } else {
                    attempt.error_type = classify_status(outcome.status_code as u16);
                    attempt.error_message = Some(format!("HTTP {}", outcome.status_code));
                }

                info!(
                    run_id = %run_id,
                    attempt_number,
                    status = outcome.status_code,
                    latency_ms,
                    "attempt completed",
                );
            }
            Err(e) => {
                attempt.completed_at = Some(Utc::now());
                let (kind, message) = classify_exception(&e);
                attempt.error_type = kind;
                attempt.error_message = Some(message.clone());
                warn!(run_id = %run_id, attempt_number, error_type = kind.as_str(), message, "attempt failed");
            }
        }

        attempt
    }

    async fn send(&self, target: &Target, body: Option<String>) -> reqwest::Result<AttemptOutcome> {
        let client = self.client.get().await;

        let method = http_method_to_reqwest(target.method);
        let mut builder = client
            .request(method, &target.url)
            .timeout(Duration::from_secs_f64(target.timeout_seconds))
            .headers(headers_to_header_map(&target.headers));

        if let Some(body) = body {
            if matches!(target.method, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch) {
                builder = builder.body(body);
            }
        }

        let response = builder.send().await?;
        let status_code = response.status().as_u16() as i32;
        let content_length = response.content_length();
        let response_headers = headers_to_json(response.headers());

        let (response_body, response_size_bytes) = if let Some(len) = content_length {
            if len as usize > MAX_RESPONSE_BODY_SIZE {
                (truncate_response_body(Some(len), ""), len as i64)
            } else {
                let bytes = response.bytes().await?;
                let text = String::from_utf8_lossy(&bytes).into_owned();
                (truncate_response_body(None, &text), bytes.len() as i64)
            }
        } else {
            let bytes = response.bytes().await?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            (truncate_response_body(None, &text), bytes.len() as i64)
        };

        Ok(AttemptOutcome {
            completed_at: Utc::now(),
            status_code,
            response_headers,
            response_body,
            response_size_bytes,
        })
    }
}

struct AttemptOutcome {
    completed_at: chrono::DateTime<Utc>,
    status_code: i32,
    response_headers: serde_json::Value,
    response_body: String,
    response_size_bytes: i64,
}

fn http_method_to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

fn headers_to_header_map(headers: &serde_json::Value) -> HeaderMap {
    let mut map = HeaderMap::new();
    if let Some(obj) = headers.as_object() {
        for (k, v) in obj {
            if let Some(value_str) = v.as_str() {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(k.as_bytes()),
                    HeaderValue::from_str(value_str),
                ) {
                    map.insert(name, value);
                }
            }
        }
    }
    map
}

fn headers_to_json(headers: &HeaderMap) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        if let Ok(value_str) = value.to_str() {
            map.insert(name.to_string(), serde_json::Value::String(value_str.to_string()));
        }
    }
    serde_json::Value::Object(map)
}
