pub mod commissions;
pub mod health;
pub mod members;
pub mod volume;

use crate::orchestration::NetworkService;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NetworkService>,
}

impl AppState {
    pub fn new(service: Arc<NetworkService>) -> Self {
        Self { service }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/members", post(members::register_member))
        .route("/v1/members/:id", get(members::get_member))
        .route("/v1/members/:id/activity", put(members::update_activity))
        .route("/v1/members/:id/placement", post(members::place_member))
        .route("/v1/members/:id/tree", get(members::get_downline_tree))
        .route(
            "/v1/members/:id/tier-eligibility",
            get(members::check_tier_eligibility),
        )
        .route(
            "/v1/members/:id/commissions",
            get(commissions::get_member_commissions),
        )
        .route("/v1/members/:id/volume", get(volume::get_team_volume))
        .route(
            "/v1/members/:id/volume/snapshot",
            get(volume::get_volume_snapshot),
        )
        .route("/v1/events", post(commissions::record_event))
        .route("/v1/commissions/paid", post(commissions::mark_paid))
        .route("/v1/commissions/cancel", post(commissions::cancel))
        .layer(cors)
        .with_state(state)
}
