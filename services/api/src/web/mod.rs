pub mod dto;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use rest::*;
use state::AppState;

pub use middleware::require_user;

/// All API routes, each behind the `x-user-id` identity check.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dogs", get(list_dogs_handler).post(create_dog_handler))
        .route(
            "/dogs/{id}",
            get(get_dog_handler)
                .patch(update_dog_handler)
                .delete(delete_dog_handler),
        )
        .route("/dogs/{id}/tip", get(dog_tip_handler))
        .route("/dogs/{id}/sessions", get(dog_sessions_handler))
        .route("/plans", get(list_plans_handler).post(create_plans_handler))
        .route("/plans/{id}", get(get_plan_handler).delete(delete_plan_handler))
        .route("/plans/{id}/start", post(start_plan_handler))
        .route("/plans/{id}/steps", get(list_steps_handler))
        .route(
            "/plans/{id}/steps/{index}/session",
            get(get_session_view_handler).post(submit_session_handler),
        )
        .route("/steps/{id}/sessions", get(step_sessions_handler))
        .route("/chat", get(chat_history_handler).post(send_chat_handler))
        .route("/dashboard", get(dashboard_handler))
        .layer(from_fn(require_user))
        .with_state(app_state)
}
