use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use retenza::error::AppError;
use retenza::loyalty::{
    loyalty_router, LoyaltyRepository, LoyaltyService, MissionRepository, NotificationPublisher,
    Reward, Tier, TierLadder,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct TierPreviewRequest {
    pub(crate) points: u64,
    pub(crate) tiers: Vec<Tier>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TierPreviewResponse {
    pub(crate) points: u64,
    pub(crate) tier: String,
    pub(crate) rewards: Vec<Reward>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) next_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) points_to_next_tier: Option<u64>,
}

pub(crate) fn with_loyalty_routes<R, M, N>(service: Arc<LoyaltyService<R, M, N>>) -> axum::Router
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    loyalty_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/tiers/resolve",
            axum::routing::post(tier_preview_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Resolve a balance against an ad-hoc ladder so businesses can try thresholds before saving.
pub(crate) async fn tier_preview_endpoint(
    Json(payload): Json<TierPreviewRequest>,
) -> Result<Json<TierPreviewResponse>, AppError> {
    let TierPreviewRequest { points, tiers } = payload;
    let ladder = TierLadder::new(tiers)?;
    let tier = ladder.resolve(points)?;
    let next = ladder.next_after(points);

    Ok(Json(TierPreviewResponse {
        points,
        tier: tier.name.clone(),
        rewards: tier.rewards.clone(),
        next_tier: next.map(|next| next.name.clone()),
        points_to_next_tier: next.map(|next| next.points_to_unlock - points),
    }))
}
