use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use crate::engine::Engine;
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub subscribers: SubscriberHealth,
    pub schedule: ScheduleHealth,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriberHealth {
    pub total: usize,
    pub per_grade: std::collections::BTreeMap<String, usize>,
    pub admins: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleHealth {
    /// Last successful spreadsheet fetch, if any since start.
    pub last_fetch: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub start_time: DateTime<Utc>,
}

pub struct HealthService {
    pub router: Router,
}

impl HealthService {
    pub fn new(engine: Arc<Engine>) -> Self {
        let state = AppState {
            engine,
            start_time: Utc::now(),
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/health/ready", get(readiness_check))
            .route("/health/live", get(liveness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        Self { router }
    }
}

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, StatusCode> {
    let roster = state.engine.roster();
    let uptime = Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds()
        .max(0) as u64;

    let per_grade = roster
        .counts()
        .into_iter()
        .map(|(grade, count)| (grade.to_string(), count))
        .collect();

    let health_response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: SubscriberHealth {
            total: roster.subscriber_count(),
            per_grade,
            admins: state.engine.admin_count(),
        },
        schedule: ScheduleHealth {
            last_fetch: state.engine.last_fetch(),
        },
        uptime_seconds: uptime,
    };

    Ok(Json(health_response))
}

async fn readiness_check(State(state): State<AppState>) -> Result<Json<&'static str>, StatusCode> {
    match state.engine.persistence().check() {
        Ok(_) => Ok(Json("ready")),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn liveness_check() -> Json<&'static str> {
    // Simple liveness check - if this endpoint responds, the service is alive
    Json("alive")
}
