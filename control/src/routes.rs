use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::app_state::SharedState;
use crate::{control, handlers};

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/status", get(handlers::status_handler))
        .route("/control", post(control::handle_control_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
