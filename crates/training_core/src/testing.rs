//! In-memory stand-ins for the ports, shared by the unit tests of this crate
//! and, through the `testing` feature, by the service crates.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    ChatMessage, Difficulty, Dog, DogMood, DogUpdate, NewDog, NewTrainingPlan,
    NewTrainingSession, PlanStatus, PlanWithDog, TrainerMood, TrainingPlan, TrainingSession,
    TrainingStep,
};
use crate::ports::{
    ChatCompletionService, CompletionRequest, DatabaseService, GeneratedPlan,
    PlanGenerationRequest, PlanGenerationService, PortError, PortResult,
};

//=========================================================================================
// Fixtures
//=========================================================================================

pub fn step_in(plan_id: Uuid, day: u32, completed: bool) -> TrainingStep {
    TrainingStep {
        id: Uuid::new_v4(),
        plan_id,
        title: format!("Day {day}"),
        description: Some(format!("Exercise for day {day}")),
        day_number: day,
        duration_minutes: Some(10),
        video_url: None,
        completed,
    }
}

pub fn step(day: u32, completed: bool) -> TrainingStep {
    step_in(Uuid::new_v4(), day, completed)
}

pub fn plan(status: PlanStatus) -> TrainingPlan {
    TrainingPlan {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        dog_id: Uuid::new_v4(),
        title: "Loose leash walking".to_string(),
        description: "Walk without pulling".to_string(),
        behavior_to_correct: None,
        difficulty: Difficulty::Beginner,
        duration_weeks: 1,
        sessions_per_week: 3,
        training_days: vec!["Monday".into(), "Wednesday".into(), "Friday".into()],
        status,
        created_at: Utc::now(),
    }
}

pub fn dog(owner_id: Uuid, name: &str, date_of_birth: Option<NaiveDate>) -> Dog {
    Dog {
        id: Uuid::new_v4(),
        owner_id,
        name: name.to_string(),
        breed: None,
        date_of_birth,
        weight_lbs: None,
        created_at: Utc::now(),
    }
}

pub fn session_for(step: &TrainingStep, rating: u8) -> TrainingSession {
    TrainingSession {
        id: Uuid::new_v4(),
        step_id: step.id,
        dog_id: Uuid::new_v4(),
        completed_at: Utc::now(),
        achievements: "Held a sit for ten seconds".to_string(),
        challenges: "Squirrels".to_string(),
        next_steps: "Add distance".to_string(),
        duration_minutes: 20,
        repetitions: 8,
        environments: BTreeSet::from(["Outdoor".to_string()]),
        environment_notes: "Back yard".to_string(),
        dog_mood: DogMood::Excited,
        rating,
        treats_used: "Cheese".to_string(),
        trainer_mood: TrainerMood::Patient,
    }
}

pub fn chat_turn(user_id: Uuid, message: &str, reply: &str, minute: i64) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4(),
        user_id,
        message: message.to_string(),
        ai_response: reply.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
    }
}

//=========================================================================================
// InMemoryStore
//=========================================================================================

#[derive(Default)]
pub struct StoreState {
    pub profiles: Vec<(Uuid, String)>,
    pub dogs: Vec<Dog>,
    pub plans: Vec<PlanWithDog>,
    pub steps: Vec<TrainingStep>,
    pub sessions: Vec<TrainingSession>,
    pub chat: Vec<ChatMessage>,
    pub status_updates: Vec<(Uuid, PlanStatus)>,
    pub session_lookups: usize,
    pub fail_session_lookup: bool,
    pub fail_status_update: bool,
    pub fail_steps_for: Option<Uuid>,
    pub fail_dogs: bool,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn with(setup: impl FnOnce(&mut StoreState)) -> Self {
        let store = Self::default();
        setup(&mut store.state());
        store
    }

    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn insert_plan(&self, plan: TrainingPlan, dog_name: &str, steps: Vec<TrainingStep>) {
        let mut state = self.state();
        state.plans.push(PlanWithDog {
            plan,
            dog_name: dog_name.to_string(),
        });
        state.steps.extend(steps);
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn ensure_profile(&self, user_id: Uuid, email: &str) -> PortResult<()> {
        let mut state = self.state();
        state.profiles.retain(|(id, _)| *id != user_id);
        state.profiles.push((user_id, email.to_string()));
        Ok(())
    }

    async fn create_dog(&self, dog: NewDog) -> PortResult<Dog> {
        let created = Dog {
            id: Uuid::new_v4(),
            owner_id: dog.owner_id,
            name: dog.name,
            breed: dog.breed,
            date_of_birth: dog.date_of_birth,
            weight_lbs: dog.weight_lbs,
            created_at: Utc::now(),
        };
        self.state().dogs.push(created.clone());
        Ok(created)
    }

    async fn get_dogs_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Dog>> {
        let state = self.state();
        if state.fail_dogs {
            return Err(PortError::Unexpected("connection reset".into()));
        }
        Ok(state.dogs.iter().filter(|d| d.owner_id == owner_id).cloned().collect())
    }

    async fn get_dog_by_id(&self, dog_id: Uuid) -> PortResult<Option<Dog>> {
        Ok(self.state().dogs.iter().find(|d| d.id == dog_id).cloned())
    }

    async fn update_dog(&self, dog_id: Uuid, update: DogUpdate) -> PortResult<Dog> {
        let mut state = self.state();
        let dog = state
            .dogs
            .iter_mut()
            .find(|d| d.id == dog_id)
            .ok_or_else(|| PortError::NotFound(format!("Dog {dog_id} not found")))?;
        if let Some(name) = update.name {
            dog.name = name;
        }
        if let Some(breed) = update.breed {
            dog.breed = Some(breed);
        }
        if let Some(dob) = update.date_of_birth {
            dog.date_of_birth = Some(dob);
        }
        if let Some(weight) = update.weight_lbs {
            dog.weight_lbs = Some(weight);
        }
        Ok(dog.clone())
    }

    async fn delete_dog(&self, dog_id: Uuid) -> PortResult<()> {
        self.state().dogs.retain(|d| d.id != dog_id);
        Ok(())
    }

    async fn create_plan(&self, plan: NewTrainingPlan) -> PortResult<PlanWithDog> {
        let mut state = self.state();
        let dog_name = state
            .dogs
            .iter()
            .find(|d| d.id == plan.dog_id)
            .map(|d| d.name.clone())
            .ok_or_else(|| PortError::NotFound(format!("Dog {} not found", plan.dog_id)))?;
        let stored = TrainingPlan {
            id: Uuid::new_v4(),
            user_id: plan.user_id,
            dog_id: plan.dog_id,
            title: plan.title,
            description: plan.description,
            behavior_to_correct: plan.behavior_to_correct,
            difficulty: plan.difficulty,
            duration_weeks: plan.duration_weeks,
            sessions_per_week: plan.sessions_per_week,
            training_days: plan.training_days,
            status: plan.status,
            created_at: Utc::now(),
        };
        for new_step in plan.steps {
            state.steps.push(TrainingStep {
                id: Uuid::new_v4(),
                plan_id: stored.id,
                title: new_step.title,
                description: Some(new_step.description),
                day_number: new_step.day_number,
                duration_minutes: Some(new_step.duration_minutes),
                video_url: None,
                completed: false,
            });
        }
        let with_dog = PlanWithDog {
            plan: stored,
            dog_name,
        };
        state.plans.push(with_dog.clone());
        Ok(with_dog)
    }

    async fn get_plans_by_user(&self, user_id: Uuid) -> PortResult<Vec<PlanWithDog>> {
        Ok(self
            .state()
            .plans
            .iter()
            .filter(|p| p.plan.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_plan_by_id(&self, plan_id: Uuid) -> PortResult<Option<PlanWithDog>> {
        Ok(self.state().plans.iter().find(|p| p.plan.id == plan_id).cloned())
    }

    async fn update_plan_status(
        &self,
        plan_id: Uuid,
        status: PlanStatus,
    ) -> PortResult<TrainingPlan> {
        let mut state = self.state();
        if state.fail_status_update {
            return Err(PortError::Unexpected("status update rejected".into()));
        }
        state.status_updates.push((plan_id, status));
        let entry = state
            .plans
            .iter_mut()
            .find(|p| p.plan.id == plan_id)
            .ok_or_else(|| PortError::NotFound(format!("Plan {plan_id} not found")))?;
        if entry.plan.status.can_advance_to(status) {
            entry.plan.status = status;
        }
        Ok(entry.plan.clone())
    }

    async fn delete_plan(&self, plan_id: Uuid) -> PortResult<()> {
        let mut state = self.state();
        if state.steps.iter().any(|s| s.plan_id == plan_id) {
            return Err(PortError::Unexpected(
                "foreign key violation: steps still reference plan".into(),
            ));
        }
        state.plans.retain(|p| p.plan.id != plan_id);
        Ok(())
    }

    async fn get_steps_for_plan(&self, plan_id: Uuid) -> PortResult<Vec<TrainingStep>> {
        let state = self.state();
        if state.fail_steps_for == Some(plan_id) {
            return Err(PortError::Unexpected("steps fetch failed".into()));
        }
        let mut steps: Vec<TrainingStep> = state
            .steps
            .iter()
            .filter(|s| s.plan_id == plan_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.day_number);
        Ok(steps)
    }

    async fn update_step_completed(
        &self,
        step_id: Uuid,
        completed: bool,
    ) -> PortResult<TrainingStep> {
        let mut state = self.state();
        let step = state
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| PortError::NotFound(format!("Step {step_id} not found")))?;
        step.completed = completed;
        Ok(step.clone())
    }

    async fn delete_steps_for_plan(&self, plan_id: Uuid) -> PortResult<()> {
        self.state().steps.retain(|s| s.plan_id != plan_id);
        Ok(())
    }

    async fn create_session(&self, session: NewTrainingSession) -> PortResult<TrainingSession> {
        let created = TrainingSession {
            id: Uuid::new_v4(),
            step_id: session.step_id,
            dog_id: session.dog_id,
            completed_at: session.completed_at,
            achievements: session.achievements,
            challenges: session.challenges,
            next_steps: session.next_steps,
            duration_minutes: session.duration_minutes,
            repetitions: session.repetitions,
            environments: session.environments,
            environment_notes: session.environment_notes,
            dog_mood: session.dog_mood,
            rating: session.rating,
            treats_used: session.treats_used,
            trainer_mood: session.trainer_mood,
        };
        self.state().sessions.push(created.clone());
        Ok(created)
    }

    async fn get_latest_session_for_step(
        &self,
        step_id: Uuid,
    ) -> PortResult<Option<TrainingSession>> {
        let mut state = self.state();
        state.session_lookups += 1;
        if state.fail_session_lookup {
            return Err(PortError::Unexpected("network unreachable".into()));
        }
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.step_id == step_id)
            .max_by_key(|s| s.completed_at)
            .cloned())
    }

    async fn get_sessions_for_step(&self, step_id: Uuid) -> PortResult<Vec<TrainingSession>> {
        let mut sessions: Vec<TrainingSession> = self
            .state()
            .sessions
            .iter()
            .filter(|s| s.step_id == step_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(sessions)
    }

    async fn get_sessions_for_dog(&self, dog_id: Uuid) -> PortResult<Vec<TrainingSession>> {
        let mut sessions: Vec<TrainingSession> = self
            .state()
            .sessions
            .iter()
            .filter(|s| s.dog_id == dog_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(sessions)
    }

    async fn get_sessions_for_plan(&self, plan_id: Uuid) -> PortResult<Vec<TrainingSession>> {
        let state = self.state();
        let step_ids: BTreeSet<Uuid> = state
            .steps
            .iter()
            .filter(|s| s.plan_id == plan_id)
            .map(|s| s.id)
            .collect();
        Ok(state
            .sessions
            .iter()
            .filter(|s| step_ids.contains(&s.step_id))
            .cloned()
            .collect())
    }

    async fn create_chat_message(
        &self,
        user_id: Uuid,
        message: &str,
        ai_response: &str,
    ) -> PortResult<ChatMessage> {
        let created = ChatMessage {
            id: Uuid::new_v4(),
            user_id,
            message: message.to_string(),
            ai_response: ai_response.to_string(),
            created_at: Utc::now(),
        };
        self.state().chat.push(created.clone());
        Ok(created)
    }

    async fn get_chat_history(&self, user_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        let mut history: Vec<ChatMessage> = self
            .state()
            .chat
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        history.sort_by_key(|m| m.created_at);
        Ok(history)
    }
}

//=========================================================================================
// Scripted Language Models
//=========================================================================================

/// Replies with a fixed outcome and records every request it receives.
pub struct ScriptedModel {
    reply: Result<String, String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatCompletionService for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> PortResult<String> {
        self.requests.lock().unwrap().push(request);
        self.reply.clone().map_err(PortError::Unexpected)
    }
}

pub struct ScriptedPlanner {
    plan: Result<GeneratedPlan, String>,
    pub requests: Mutex<Vec<PlanGenerationRequest>>,
}

impl ScriptedPlanner {
    pub fn returning(plan: GeneratedPlan) -> Self {
        Self {
            plan: Ok(plan),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            plan: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PlanGenerationService for ScriptedPlanner {
    async fn generate_plan(&self, request: &PlanGenerationRequest) -> PortResult<GeneratedPlan> {
        self.requests.lock().unwrap().push(request.clone());
        self.plan.clone().map_err(PortError::InvalidResponse)
    }
}
