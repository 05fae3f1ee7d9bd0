pub mod identity;
pub mod query;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::dispatch::Dispatcher;
use crate::api::identity::IdentityProvider;

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub identity: Arc<dyn IdentityProvider>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(query::run_query))
        .route("/healthz", get(query::healthz))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
