pub mod chat;
pub mod dashboard;
pub mod domain;
pub mod planning;
pub mod ports;
pub mod progress;
pub mod propagate;
pub mod reconcile;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use domain::{
    ChatMessage, Difficulty, Dog, DogMood, DogUpdate, NewDog, NewTrainingPlan, NewTrainingSession,
    NewTrainingStep, PlanStatus, PlanWithDog, TrainerMood, TrainingPlan, TrainingSession,
    TrainingStep,
};
pub use ports::{
    ChatCompletionService, CompletionRequest, DatabaseService, GeneratedPlan, ModelTier,
    PlanGenerationRequest, PlanGenerationService, PortError, PortResult, PromptMessage,
    PromptRole,
};
