//! Hook and review HTTP server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use nitpick_core::config::log_file_path;
use nitpick_core::review::{error_feedback, request_review};
use nitpick_core::{
    AgentConfig, HookEnvelope, Payload, ReviewRequest, ReviewerConfig, SessionKey, SessionRegistry,
};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hook/{session_id}", post(hook_handler))
        .route("/review", post(review_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Queue the event on the session's agent and answer right away.
///
/// The event is queued before responding, so events a host sends one after
/// another reach the agent in that order. Backend work happens later in the
/// agent's consumer.
async fn hook_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(mut envelope): Json<HookEnvelope>,
) -> (StatusCode, Json<Value>) {
    let Some(source_path) = envelope.source_path.clone().filter(|p| !p.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "source_path is required" })),
        );
    };
    envelope.stamp_received();
    info!(session = %session_id, "Hook event {} from {}", envelope.event, source_path);

    let project = PathBuf::from(source_path);
    let key = SessionKey::session(project.clone(), session_id.clone());
    let sid = session_id.clone();
    let agent = state
        .registry
        .resolve_or_load(key, move || {
            AgentConfig::hook(&project, &sid, &ReviewerConfig::load(&project))
        })
        .await;
    match agent {
        Ok(agent) => {
            if let Err(e) = agent.submit_fire_and_forget(Payload::HookEvent(envelope)) {
                warn!(session = %session_id, "Failed to queue hook event: {}", e);
            }
        }
        Err(e) => error!(session = %session_id, "Failed to start session agent: {}", e),
    }

    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "session_id": session_id })),
    )
}

/// Synchronous review. Failures come back as marked feedback text.
async fn review_handler(
    State(state): State<AppState>,
    Json(request): Json<ReviewRequest>,
) -> Json<Value> {
    let feedback = match request_review(&state.registry, request).await {
        Ok(feedback) => feedback,
        Err(e) => {
            error!("Review failed: {}", e);
            error_feedback(e, log_file_path().ok().as_deref())
        }
    };
    Json(json!({ "feedback": feedback }))
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let sessions: Vec<Value> = state
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(|(key, stats)| {
            json!({
                "key": key.to_string(),
                "running": stats.running,
                "reviews": stats.reviews,
                "turns": stats.turns,
                "has_summary": stats.has_summary,
                "pending": stats.pending,
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "active_sessions": sessions.len(),
        "sessions": sessions,
    }))
}

/// Evict idle agents every quarter of the timeout
pub fn spawn_idle_sweeper(
    registry: Arc<SessionRegistry>,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    let interval = (max_idle / 4).max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let evicted = registry.sweep_idle(max_idle).await;
            if !evicted.is_empty() {
                info!("Evicted {} idle session(s)", evicted.len());
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Serve until Ctrl-C, then stop every session agent
pub async fn run(
    host: &str,
    port: u16,
    registry: Arc<SessionRegistry>,
    idle_timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let sweeper = idle_timeout.map(|max| spawn_idle_sweeper(registry.clone(), max));
    let app = router(AppState {
        registry: registry.clone(),
    });

    let bind_address = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Nitpick server listening on http://{}", bind_address);
    eprintln!("Nitpick server listening on http://{}", bind_address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    registry.shutdown_all().await;
    info!("Nitpick server stopped");
    served?;
    Ok(())
}
