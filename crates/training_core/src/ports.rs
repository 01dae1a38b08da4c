//! crates/training_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted database and the language-model API.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ChatMessage, Difficulty, Dog, DogUpdate, NewDog, NewTrainingPlan, NewTrainingSession,
    PlanStatus, PlanWithDog, TrainingPlan, TrainingSession, TrainingStep,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// Marker the language-model API uses when a request exceeds the model's window.
pub const CONTEXT_LENGTH_MARKER: &str = "maximum context length";

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Request exceeded the model's maximum context length: {0}")]
    ContextLengthExceeded(String),
    #[error("Invalid response from the language model: {0}")]
    InvalidResponse(String),
}

impl PortError {
    /// True when the failure means the prompt was too large for the model.
    pub fn is_context_length_exceeded(&self) -> bool {
        match self {
            PortError::ContextLengthExceeded(_) => true,
            PortError::NotFound(msg)
            | PortError::Unexpected(msg)
            | PortError::InvalidResponse(msg) => msg.contains(CONTEXT_LENGTH_MARKER),
            PortError::Unauthorized => false,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Remote Store Port
//=========================================================================================

/// Reads and writes against the hosted relational store.
///
/// Read-by-id lookups return `Ok(None)` for absent rows; `Err` is reserved for
/// transport, authorization and constraint failures.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Profiles ---
    async fn ensure_profile(&self, user_id: Uuid, email: &str) -> PortResult<()>;

    // --- Dogs ---
    async fn create_dog(&self, dog: NewDog) -> PortResult<Dog>;

    /// Newest first.
    async fn get_dogs_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Dog>>;

    async fn get_dog_by_id(&self, dog_id: Uuid) -> PortResult<Option<Dog>>;

    async fn update_dog(&self, dog_id: Uuid, update: DogUpdate) -> PortResult<Dog>;

    async fn delete_dog(&self, dog_id: Uuid) -> PortResult<()>;

    // --- Training Plans ---
    /// Creates the plan and all of its steps atomically.
    async fn create_plan(&self, plan: NewTrainingPlan) -> PortResult<PlanWithDog>;

    async fn get_plans_by_user(&self, user_id: Uuid) -> PortResult<Vec<PlanWithDog>>;

    async fn get_plan_by_id(&self, plan_id: Uuid) -> PortResult<Option<PlanWithDog>>;

    /// Only moves a plan forward. A request that would not advance it leaves
    /// the stored status alone and returns the plan as stored.
    async fn update_plan_status(
        &self,
        plan_id: Uuid,
        status: PlanStatus,
    ) -> PortResult<TrainingPlan>;

    /// Does not cascade; child steps must be deleted first.
    async fn delete_plan(&self, plan_id: Uuid) -> PortResult<()>;

    // --- Training Steps ---
    /// Ordered by `day_number` ascending.
    async fn get_steps_for_plan(&self, plan_id: Uuid) -> PortResult<Vec<TrainingStep>>;

    async fn update_step_completed(
        &self,
        step_id: Uuid,
        completed: bool,
    ) -> PortResult<TrainingStep>;

    async fn delete_steps_for_plan(&self, plan_id: Uuid) -> PortResult<()>;

    // --- Training Sessions ---
    async fn create_session(&self, session: NewTrainingSession) -> PortResult<TrainingSession>;

    /// The most recent session by completion time, if any.
    async fn get_latest_session_for_step(
        &self,
        step_id: Uuid,
    ) -> PortResult<Option<TrainingSession>>;

    /// Newest first.
    async fn get_sessions_for_step(&self, step_id: Uuid) -> PortResult<Vec<TrainingSession>>;

    /// Newest first.
    async fn get_sessions_for_dog(&self, dog_id: Uuid) -> PortResult<Vec<TrainingSession>>;

    async fn get_sessions_for_plan(&self, plan_id: Uuid) -> PortResult<Vec<TrainingSession>>;

    // --- Chat History ---
    async fn create_chat_message(
        &self,
        user_id: Uuid,
        message: &str,
        ai_response: &str,
    ) -> PortResult<ChatMessage>;

    /// Oldest first.
    async fn get_chat_history(&self, user_id: Uuid) -> PortResult<Vec<ChatMessage>>;
}

//=========================================================================================
// Language-Model Ports
//=========================================================================================

/// Which class of model a completion should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Cheaper, lower-capability model.
    Fast,
    /// Higher-capability model.
    Capable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single chat completion request, fully prepared by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<PromptMessage>,
    pub tier: ModelTier,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Returns the text of the first completion choice.
    async fn complete(&self, request: CompletionRequest) -> PortResult<String>;
}

/// Inputs for generating a structured training plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanGenerationRequest {
    pub dog_name: String,
    pub breed: Option<String>,
    pub age_years: Option<u32>,
    pub goal: String,
    pub difficulty: Difficulty,
    pub duration_weeks: u32,
    pub sessions_per_week: u32,
    pub behavior_to_correct: Option<String>,
}

impl PlanGenerationRequest {
    pub fn expected_step_count(&self) -> u32 {
        self.sessions_per_week.saturating_mul(self.duration_weeks)
    }
}

/// A plan as returned by the model, before it is persisted.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct GeneratedPlan {
    pub title: String,
    pub description: String,
    pub steps: Vec<GeneratedStep>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStep {
    pub title: String,
    pub description: String,
    #[serde(alias = "day_number")]
    pub day_number: u32,
    #[serde(alias = "duration_minutes")]
    pub duration_minutes: u32,
}

#[async_trait]
pub trait PlanGenerationService: Send + Sync {
    /// Generates a plan. Malformed or missing output is an error, never recovered.
    async fn generate_plan(&self, request: &PlanGenerationRequest) -> PortResult<GeneratedPlan>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_length_is_recognised_by_substring() {
        let err = PortError::Unexpected(
            "invalid_request_error: This model's maximum context length is 4097 tokens".into(),
        );
        assert!(err.is_context_length_exceeded());
        assert!(PortError::ContextLengthExceeded("too long".into()).is_context_length_exceeded());
        assert!(!PortError::Unexpected("timeout".into()).is_context_length_exceeded());
        assert!(!PortError::Unauthorized.is_context_length_exceeded());
    }

    #[test]
    fn step_count_saturates_instead_of_wrapping() {
        let mut request = PlanGenerationRequest {
            dog_name: "Rex".into(),
            breed: None,
            age_years: None,
            goal: "Recall".into(),
            difficulty: Difficulty::Beginner,
            duration_weeks: 4,
            sessions_per_week: 3,
            behavior_to_correct: None,
        };
        assert_eq!(request.expected_step_count(), 12);
        request.duration_weeks = 100_000;
        request.sessions_per_week = 100_000;
        assert_eq!(request.expected_step_count(), u32::MAX);
    }
}
