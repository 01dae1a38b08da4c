//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;
use training_core::ports::{ChatCompletionService, DatabaseService, PlanGenerationService};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub chat_model: Arc<dyn ChatCompletionService>,
    pub planner: Arc<dyn PlanGenerationService>,
}
