//! crates/training_core/src/planning.rs
//!
//! Creating plans through the language model and deleting them again.

use chrono::NaiveDate;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    Difficulty, Dog, NewTrainingPlan, NewTrainingStep, PlanStatus, PlanWithDog,
};
use crate::ports::{
    DatabaseService, GeneratedPlan, PlanGenerationRequest, PlanGenerationService, PortError,
    PortResult,
};

pub const DEFAULT_TRAINING_DAYS: [&str; 3] = ["Monday", "Wednesday", "Friday"];
const FALLBACK_TITLE: &str = "Training Plan";
pub const MAX_DURATION_WEEKS: u32 = 12;
pub const MAX_SESSIONS_PER_WEEK: u32 = 7;

/// What the user asked for on the plan-creation form.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCreationRequest {
    pub dog_ids: Vec<Uuid>,
    pub goal: String,
    pub behavior_to_correct: Option<String>,
    pub difficulty: Difficulty,
    pub duration_weeks: u32,
    pub sessions_per_week: u32,
    pub training_days: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Dog {0} was not found for this user")]
    UnknownDog(Uuid),
    #[error("Plan generation failed: {0}")]
    Generation(PortError),
    #[error("Generated plan is unusable: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Persistence(#[from] PortError),
}

impl PlanCreationRequest {
    pub fn validate(&self) -> Result<(), PlanningError> {
        if self.dog_ids.is_empty() || self.goal.trim().is_empty() {
            return Err(PlanningError::InvalidRequest(
                "Please select at least one dog and specify a training goal".to_string(),
            ));
        }
        if self.duration_weeks < 1 {
            return Err(PlanningError::InvalidRequest(
                "Duration must be at least 1 week".to_string(),
            ));
        }
        if self.sessions_per_week < 1 {
            return Err(PlanningError::InvalidRequest(
                "At least 1 session per week is required".to_string(),
            ));
        }
        if self.duration_weeks > MAX_DURATION_WEEKS {
            return Err(PlanningError::InvalidRequest(format!(
                "Duration cannot exceed {MAX_DURATION_WEEKS} weeks"
            )));
        }
        if self.sessions_per_week > MAX_SESSIONS_PER_WEEK {
            return Err(PlanningError::InvalidRequest(format!(
                "At most {MAX_SESSIONS_PER_WEEK} sessions per week are allowed"
            )));
        }
        Ok(())
    }

    fn behavior(&self) -> Option<String> {
        self.behavior_to_correct
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
    }

    fn generation_request(&self, dog: &Dog, today: NaiveDate) -> PlanGenerationRequest {
        PlanGenerationRequest {
            dog_name: dog.name.clone(),
            breed: dog.breed.clone().filter(|b| !b.trim().is_empty()),
            age_years: dog.age_years(today),
            goal: self.goal.trim().to_string(),
            difficulty: self.difficulty,
            duration_weeks: self.duration_weeks,
            sessions_per_week: self.sessions_per_week,
            behavior_to_correct: self.behavior(),
        }
    }
}

//=========================================================================================
// Prompt and Output Contract
//=========================================================================================

/// The user prompt asking the model for a structured plan.
pub fn plan_prompt(request: &PlanGenerationRequest) -> String {
    let weeks = request.duration_weeks;
    let per_week = request.sessions_per_week;
    let mut prompt = format!(
        "Create a {weeks}-week {} level dog training plan for {}",
        request.difficulty, request.dog_name
    );
    if let Some(breed) = &request.breed {
        prompt.push_str(&format!(" ({breed})"));
    }
    if let Some(age) = request.age_years.filter(|a| *a > 0) {
        prompt.push_str(&format!(", age {age} years"));
    }
    prompt.push_str(&format!(", with {per_week} training sessions per week.\n"));

    if let Some(behavior) = &request.behavior_to_correct {
        prompt.push_str(&format!(
            "Primary focus: Correcting the following behavior issue: {behavior}\n\
             This behavior should be addressed through positive reinforcement techniques, \
             while also working towards the overall training goal.\n"
        ));
    }
    prompt.push_str(&format!("Overall training goal: {}\n\n", request.goal));

    prompt.push_str("Please provide a structured plan that:\n");
    if request.behavior_to_correct.is_some() {
        prompt.push_str(
            "1. Addresses the behavior issue through:\n\
             \x20  - Understanding and managing triggers\n\
             \x20  - Teaching alternative behaviors\n\
             \x20  - Positive reinforcement techniques\n\
             \x20  - Environmental management strategies\n\
             2. Integrates behavior correction with overall training goals\n\
             3. Provides clear progress markers\n\n",
        );
    } else {
        prompt.push_str("1. Focuses on achieving the training goal through progressive steps\n\n");
    }

    prompt.push_str(&format!(
        "Include in your response:\n\
         1. A title for the training program\n\
         2. A brief description of what will be achieved\n\
         3. A list of exactly {} training steps ({per_week} sessions per week for {weeks} weeks). \
         Each step should include:\n\
         \x20  - Title of the exercise\n\
         \x20  - Detailed description of how to perform it\n\
         \x20  - Estimated duration in minutes\n\
         \x20  - Day number in the program (spread evenly across the {weeks} weeks)\n",
        request.expected_step_count()
    ));
    if request.behavior_to_correct.is_some() {
        prompt.push_str(
            "   - How this exercise helps with behavior correction (when applicable)\n",
        );
    }

    prompt.push_str(
        "\nFormat the response as a JSON object with this structure:\n\
         {\n  \"title\": \"string\",\n  \"description\": \"string\",\n  \"steps\": [\n    {\n\
         \x20     \"title\": \"string\",\n      \"description\": \"string\",\n\
         \x20     \"dayNumber\": number,\n      \"durationMinutes\": number\n    }\n  ]\n}",
    );
    prompt
}

/// Parses the model's JSON output. Malformed output is an error, never patched up.
pub fn parse_generated_plan(raw: &str) -> PortResult<GeneratedPlan> {
    serde_json::from_str(raw.trim()).map_err(|e| {
        PortError::InvalidResponse(format!("Failed to parse generated plan JSON: {e}"))
    })
}

fn into_new_steps(plan: &GeneratedPlan) -> Result<Vec<NewTrainingStep>, PlanningError> {
    plan.steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            if step.title.trim().is_empty() || step.description.trim().is_empty() {
                return Err(PlanningError::InvalidPlan(format!(
                    "step {} is missing a title or description",
                    i + 1
                )));
            }
            Ok(NewTrainingStep {
                title: step.title.trim().to_string(),
                description: step.description.trim().to_string(),
                day_number: step.day_number,
                duration_minutes: step.duration_minutes,
            })
        })
        .collect()
}

//=========================================================================================
// Flows
//=========================================================================================

/// Generates and stores one plan per selected dog, one dog at a time.
///
/// Plans stored before a failure are kept; the error reports the failing dog.
pub async fn create_plans(
    db: &dyn DatabaseService,
    generator: &dyn PlanGenerationService,
    user_id: Uuid,
    request: &PlanCreationRequest,
    today: NaiveDate,
) -> Result<Vec<PlanWithDog>, PlanningError> {
    request.validate()?;

    let dogs = db.get_dogs_by_owner(user_id).await?;
    let training_days = if request.training_days.is_empty() {
        DEFAULT_TRAINING_DAYS.iter().map(|d| d.to_string()).collect()
    } else {
        request.training_days.clone()
    };

    let mut created = Vec::with_capacity(request.dog_ids.len());
    for dog_id in &request.dog_ids {
        let dog = dogs
            .iter()
            .find(|d| d.id == *dog_id)
            .ok_or(PlanningError::UnknownDog(*dog_id))?;

        let generation = request.generation_request(dog, today);
        info!(
            "Generating {} plan for dog {} ({} weeks, {} sessions/week)",
            generation.difficulty, dog.id, generation.duration_weeks, generation.sessions_per_week
        );
        let generated = generator.generate_plan(&generation).await.map_err(|e| {
            error!("Training plan generation failed for dog {}: {}", dog.id, e);
            PlanningError::Generation(e)
        })?;

        let expected = generation.expected_step_count() as usize;
        if generated.steps.len() != expected {
            warn!(
                "Generated plan for dog {} has {} steps, expected {}",
                dog.id,
                generated.steps.len(),
                expected
            );
        }
        let steps = into_new_steps(&generated)?;

        let title = match generated.title.trim() {
            "" => FALLBACK_TITLE.to_string(),
            t => t.to_string(),
        };
        let plan = db
            .create_plan(NewTrainingPlan {
                dog_id: dog.id,
                user_id,
                title,
                description: generated.description.trim().to_string(),
                behavior_to_correct: request.behavior(),
                difficulty: request.difficulty,
                duration_weeks: request.duration_weeks,
                sessions_per_week: request.sessions_per_week,
                training_days: training_days.clone(),
                status: PlanStatus::NotStarted,
                steps,
            })
            .await?;
        info!("Training plan {} created for dog {}", plan.plan.id, dog.id);
        created.push(plan);
    }

    Ok(created)
}

/// Deletes a plan's steps and then the plan itself.
pub async fn delete_plan_cascade(db: &dyn DatabaseService, plan_id: Uuid) -> PortResult<()> {
    db.delete_steps_for_plan(plan_id).await?;
    db.delete_plan(plan_id).await?;
    info!("Training plan {} deleted", plan_id);
    Ok(())
}
