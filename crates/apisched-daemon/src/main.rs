//! apisched-daemon entry point.
//!
//! Thin by design: load config, connect the Store, run startup recovery,
//! wire the Trigger Engine to the Coordinator, and serve the control API.
//! All route handlers live in `routes.rs`; all shared state in `state.rs`.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use apisched_coordinator::Coordinator;
use apisched_daemon::{routes, state};
use apisched_executor::Executor;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience only; silent if absent. Production injects env vars
    // directly, the same convention the teacher's daemon uses.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = apisched_config::Settings::from_env().context("load settings")?;
    let pool = apisched_db::connect(&settings.database_url).await?;
    apisched_db::migrate(&pool).await?;

    let executor = Arc::new(Executor::new(
        settings.verify_ssl,
        settings.max_retries as u32,
        settings.retry_delay_seconds,
    ));
    let coordinator = Coordinator::new(pool.clone(), executor.clone(), settings.clone());

    coordinator.recover().await.context("startup recovery")?;

    let engine = coordinator.engine();
    let fire_coordinator = coordinator.clone();
    let callback: Arc<dyn Fn(Uuid) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync> = {
        Arc::new(move |schedule_id: Uuid| {
            let coordinator = fire_coordinator.clone();
            Box::pin(async move { coordinator.on_fire(schedule_id).await })
        })
    };
    let engine_for_run = engine.clone();
    tokio::spawn(async move { engine_for_run.run(callback).await });
    let sweeper_handle = tokio::spawn(coordinator.clone().run_sweeper());

    let shared = state::AppState::new(pool, coordinator, settings.clone());
    let app = routes::build_router(shared)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = settings.bind_addr.parse().context("invalid APISCHED_BIND_ADDR")?;
    info!("apisched-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(engine.clone()))
        .await
        .context("server crashed")?;

    info!("waiting for in-flight fire callbacks to finish");
    engine.join_in_flight().await;
    sweeper_handle.abort();

    Ok(())
}

/// Stops the Trigger Engine's tick loop once ctrl-c is received.
/// `axum::serve`'s own graceful shutdown only covers in-flight HTTP
/// connections, so the caller still has to wait on
/// `engine.join_in_flight()` after this resolves and `serve` returns
/// (§5, "wait for in-flight callbacks to complete").
async fn shutdown_signal(engine: Arc<apisched_trigger::TriggerEngine>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, stopping trigger engine");
    engine.stop();
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}
