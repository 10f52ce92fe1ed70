pub mod affiliates;
pub mod overview;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use common::config::DashboardConfig;
use common::smartico::{PageSettings, SmarticoClient};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::aggregation::players::PlayerSettings;
use crate::aggregation::ExclusionRule;
use crate::models::DailyHistoryPoint;

/// Shared, read-only state for all handlers. Nothing here changes after startup.
pub struct AppState {
    pub client: SmarticoClient,
    pub pages: PageSettings,
    pub exclusion: ExclusionRule,
    pub players: PlayerSettings,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn from_config(
        config: &DashboardConfig,
        prometheus: Option<PrometheusHandle>,
    ) -> Result<Self> {
        Ok(Self {
            client: SmarticoClient::from_config(&config.smartico)?,
            pages: PageSettings::from_config(&config.smartico),
            exclusion: ExclusionRule::from_config(&config.aggregation),
            players: PlayerSettings {
                ftd_fallback_amount: config.aggregation.ftd_fallback_amount,
                report_limit: config.aggregation.player_report_limit,
            },
            started_at: chrono::Utc::now(),
            prometheus,
        })
    }
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub history: Vec<DailyHistoryPoint>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/affiliates", get(affiliates::list_affiliates))
        .route(
            "/api/affiliates/{id}/players",
            get(affiliates::list_players),
        )
        .route(
            "/api/affiliates/{id}/history",
            get(affiliates::affiliate_history),
        )
        .route("/api/overview/history", get(overview::overview_history))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
    })
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(handle) = &state.prometheus else {
        return StatusCode::NOT_FOUND.into_response();
    };
    handle.run_upkeep();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}
