//! services/api/src/web/dto.rs
//!
//! Request and response payloads of the REST API, and their conversions to and
//! from the core domain types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use training_core::{
    dashboard::{Dashboard, PlanGroups, PlanOverview},
    planning::PlanCreationRequest,
    propagate::PropagationOutcome,
    reconcile::{LookupState, SessionForm, SessionView, SubmitOutcome, ViewMode},
    ChatMessage, Difficulty, Dog, DogMood, DogUpdate, NewDog, PlanWithDog, TrainerMood,
    TrainingSession, TrainingStep,
};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{HttpError, HttpResult};

fn parse_field<T: std::str::FromStr>(value: &str) -> HttpResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| HttpError::bad_request(e.to_string()))
}

//=========================================================================================
// Dogs
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct DogResponse {
    pub id: Uuid,
    pub name: String,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_lbs: Option<f64>,
    /// Whole years since the date of birth.
    pub age_years: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl DogResponse {
    pub fn from_dog(dog: Dog, today: NaiveDate) -> Self {
        Self {
            age_years: dog.age_years(today),
            id: dog.id,
            name: dog.name,
            breed: dog.breed,
            date_of_birth: dog.date_of_birth,
            weight_lbs: dog.weight_lbs,
            created_at: dog.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDogRequest {
    pub name: String,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_lbs: Option<f64>,
}

impl CreateDogRequest {
    pub fn into_new_dog(self, owner_id: Uuid) -> HttpResult<NewDog> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(HttpError::bad_request("Please enter your dog's name"));
        }
        Ok(NewDog {
            owner_id,
            name: name.to_string(),
            breed: self.breed.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()),
            date_of_birth: self.date_of_birth,
            weight_lbs: self.weight_lbs,
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateDogRequest {
    pub name: Option<String>,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_lbs: Option<f64>,
}

impl UpdateDogRequest {
    pub fn into_update(self) -> HttpResult<DogUpdate> {
        if matches!(self.name.as_deref().map(str::trim), Some("")) {
            return Err(HttpError::bad_request("Please enter your dog's name"));
        }
        let update = DogUpdate {
            name: self.name.map(|n| n.trim().to_string()),
            breed: self.breed,
            date_of_birth: self.date_of_birth,
            weight_lbs: self.weight_lbs,
        };
        if update.is_empty() {
            return Err(HttpError::bad_request("Nothing to update"));
        }
        Ok(update)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TipResponse {
    pub tip: String,
}

//=========================================================================================
// Plans and Steps
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct StepResponse {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub day_number: u32,
    pub duration_minutes: Option<u32>,
    pub video_url: Option<String>,
    pub completed: bool,
}

impl From<TrainingStep> for StepResponse {
    fn from(step: TrainingStep) -> Self {
        Self {
            id: step.id,
            plan_id: step.plan_id,
            title: step.title,
            description: step.description,
            day_number: step.day_number,
            duration_minutes: step.duration_minutes,
            video_url: step.video_url,
            completed: step.completed,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub id: Uuid,
    pub dog_id: Uuid,
    pub dog_name: String,
    pub title: String,
    pub description: String,
    pub behavior_to_correct: Option<String>,
    /// `beginner`, `intermediate` or `advanced`.
    pub difficulty: String,
    pub duration_weeks: u32,
    pub sessions_per_week: u32,
    pub training_days: Vec<String>,
    /// The persisted status: `not_started`, `in_progress` or `completed`.
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<PlanWithDog> for PlanResponse {
    fn from(p: PlanWithDog) -> Self {
        let plan = p.plan;
        Self {
            id: plan.id,
            dog_id: plan.dog_id,
            dog_name: p.dog_name,
            title: plan.title,
            description: plan.description,
            behavior_to_correct: plan.behavior_to_correct,
            difficulty: plan.difficulty.to_string(),
            duration_weeks: plan.duration_weeks,
            sessions_per_week: plan.sessions_per_week,
            training_days: plan.training_days,
            status: plan.status.to_string(),
            created_at: plan.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanOverviewResponse {
    pub plan: PlanResponse,
    /// Status derived from the steps, never behind the persisted one.
    pub display_status: String,
    /// Percentage of completed steps, 0 to 100.
    pub progress: f64,
    pub current_step: Option<StepResponse>,
    pub steps: Vec<StepResponse>,
}

impl From<PlanOverview> for PlanOverviewResponse {
    fn from(o: PlanOverview) -> Self {
        Self {
            display_status: o.display_status.to_string(),
            progress: o.progress,
            current_step: o.current_step.map(Into::into),
            steps: o.steps.into_iter().map(Into::into).collect(),
            plan: o.plan.into(),
        }
    }
}

fn overviews(plans: Vec<PlanOverview>) -> Vec<PlanOverviewResponse> {
    plans.into_iter().map(Into::into).collect()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanGroupsResponse {
    pub active: Vec<PlanOverviewResponse>,
    pub completed: Vec<PlanOverviewResponse>,
    pub not_started: Vec<PlanOverviewResponse>,
}

impl From<PlanGroups> for PlanGroupsResponse {
    fn from(g: PlanGroups) -> Self {
        Self {
            active: overviews(g.active),
            completed: overviews(g.completed),
            not_started: overviews(g.not_started),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub plans: Vec<PlanOverviewResponse>,
    pub overall_progress: f64,
    pub current_step: Option<StepResponse>,
}

impl From<Dashboard> for DashboardResponse {
    fn from(d: Dashboard) -> Self {
        Self {
            plans: overviews(d.plans),
            overall_progress: d.overall_progress,
            current_step: d.current_step.map(Into::into),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlansQuery {
    /// When given, the user's profile row is created or refreshed first.
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePlanRequest {
    pub dog_ids: Vec<Uuid>,
    pub goal: String,
    pub behavior_to_correct: Option<String>,
    pub difficulty: String,
    pub duration_weeks: u32,
    pub sessions_per_week: u32,
    /// Defaults to Monday, Wednesday and Friday when empty.
    #[serde(default)]
    pub training_days: Vec<String>,
}

impl CreatePlanRequest {
    pub fn into_core(self) -> HttpResult<PlanCreationRequest> {
        Ok(PlanCreationRequest {
            difficulty: parse_field::<Difficulty>(&self.difficulty)?,
            dog_ids: self.dog_ids,
            goal: self.goal,
            behavior_to_correct: self.behavior_to_correct,
            duration_weeks: self.duration_weeks,
            sessions_per_week: self.sessions_per_week,
            training_days: self.training_days,
        })
    }
}

//=========================================================================================
// Training Sessions
//=========================================================================================

/// The session form as sent and received by clients. Omitted fields take the
/// form's defaults.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SessionFormDto {
    pub achievements: String,
    pub challenges: String,
    pub duration_minutes: u32,
    pub repetitions: u32,
    pub environments: Vec<String>,
    pub environment_notes: String,
    /// One of Happy, Excited, Calm, Anxious, Tired, Distracted.
    pub dog_mood: String,
    /// 1 to 5.
    pub rating: u8,
    pub treats_used: String,
    /// One of Confident, Patient, Frustrated, Tired.
    pub trainer_mood: String,
    pub next_steps: String,
}

impl Default for SessionFormDto {
    fn default() -> Self {
        (&SessionForm::default()).into()
    }
}

impl From<&SessionForm> for SessionFormDto {
    fn from(form: &SessionForm) -> Self {
        Self {
            achievements: form.achievements.clone(),
            challenges: form.challenges.clone(),
            duration_minutes: form.duration_minutes,
            repetitions: form.repetitions,
            environments: form.environments.iter().cloned().collect(),
            environment_notes: form.environment_notes.clone(),
            dog_mood: form.dog_mood.to_string(),
            rating: form.rating,
            treats_used: form.treats_used.clone(),
            trainer_mood: form.trainer_mood.to_string(),
            next_steps: form.next_steps.clone(),
        }
    }
}

impl SessionFormDto {
    pub fn into_form(self) -> HttpResult<SessionForm> {
        Ok(SessionForm {
            dog_mood: parse_field::<DogMood>(&self.dog_mood)?,
            trainer_mood: parse_field::<TrainerMood>(&self.trainer_mood)?,
            achievements: self.achievements,
            challenges: self.challenges,
            duration_minutes: self.duration_minutes,
            repetitions: self.repetitions,
            environments: self.environments.into_iter().collect(),
            environment_notes: self.environment_notes,
            rating: self.rating,
            treats_used: self.treats_used,
            next_steps: self.next_steps,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub step_id: Uuid,
    pub dog_id: Uuid,
    pub completed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: SessionFormDto,
}

impl From<TrainingSession> for SessionResponse {
    fn from(session: TrainingSession) -> Self {
        Self {
            details: (&SessionForm::from_session(&session)).into(),
            id: session.id,
            step_id: session.step_id,
            dog_id: session.dog_id,
            completed_at: session.completed_at,
        }
    }
}

/// The reconciled state of the session screen for one step.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionViewResponse {
    pub plan_id: Uuid,
    pub step_index: usize,
    pub step: Option<StepResponse>,
    /// `editable` or `read_only`.
    pub mode: String,
    /// `not_loaded`, `found`, `not_found` or `failed`.
    pub lookup: String,
    pub lookup_error: Option<String>,
    /// True when the session lookup failed and can be retried.
    pub retryable: bool,
    pub form: SessionFormDto,
    pub saved_session: Option<SessionResponse>,
}

fn mode_label(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::Editable => "editable",
        ViewMode::ReadOnly => "read_only",
    }
}

impl From<SessionView> for SessionViewResponse {
    fn from(view: SessionView) -> Self {
        let (lookup, lookup_error) = match &view.lookup {
            LookupState::NotLoaded => ("not_loaded", None),
            LookupState::Found => ("found", None),
            LookupState::NotFound => ("not_found", None),
            LookupState::Failed(msg) => ("failed", Some(msg.clone())),
        };
        Self {
            plan_id: view.plan_id,
            step_index: view.current_index,
            step: view.current_step().cloned().map(Into::into),
            mode: mode_label(view.mode).to_string(),
            lookup: lookup.to_string(),
            lookup_error,
            retryable: view.lookup.is_retryable(),
            form: (&view.form).into(),
            saved_session: view.saved_session.map(Into::into),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubmitSessionQuery {
    /// Switch a read-only session into edit mode before submitting.
    #[serde(default)]
    pub edit: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitSessionResponse {
    pub session: SessionResponse,
    pub step: StepResponse,
    pub plan_completed: bool,
    /// `steps_remaining`, `plan_completed` or `update_failed`.
    pub propagation: String,
    pub propagation_error: Option<String>,
}

impl From<SubmitOutcome> for SubmitSessionResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        let (propagation, propagation_error) = match outcome.propagation {
            PropagationOutcome::StepsRemaining => ("steps_remaining", None),
            PropagationOutcome::PlanCompleted => ("plan_completed", None),
            PropagationOutcome::UpdateFailed(msg) => ("update_failed", Some(msg)),
        };
        Self {
            session: outcome.session.into(),
            step: outcome.step.into(),
            plan_completed: propagation == "plan_completed",
            propagation: propagation.to_string(),
            propagation_error,
        }
    }
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub message: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            message: m.message,
            ai_response: m.ai_response,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendChatRequest {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_form_fields_take_defaults() {
        let dto: SessionFormDto =
            serde_json::from_str(r#"{"achievements":"Sat","challenges":"None"}"#).unwrap();
        let form = dto.into_form().unwrap();
        assert_eq!(form.duration_minutes, 15);
        assert_eq!(form.rating, 3);
        assert_eq!(form.dog_mood, DogMood::Happy);
        assert_eq!(form.trainer_mood, TrainerMood::Confident);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn unknown_labels_are_bad_requests() {
        let dto = SessionFormDto {
            dog_mood: "Grumpy".into(),
            ..SessionFormDto::default()
        };
        assert!(matches!(
            dto.into_form(),
            Err(HttpError::Status(status, _)) if status == axum::http::StatusCode::BAD_REQUEST
        ));

        let plan = CreatePlanRequest {
            dog_ids: vec![Uuid::new_v4()],
            goal: "Loose-leash walking".into(),
            behavior_to_correct: None,
            difficulty: "expert".into(),
            duration_weeks: 2,
            sessions_per_week: 3,
            training_days: vec![],
        };
        assert!(plan.into_core().is_err());
    }

    #[test]
    fn dog_requests_need_a_name() {
        let owner = Uuid::new_v4();
        let blank = CreateDogRequest {
            name: "  ".into(),
            breed: Some("Beagle".into()),
            date_of_birth: None,
            weight_lbs: None,
        };
        assert!(blank.into_new_dog(owner).is_err());

        let empty_update = UpdateDogRequest::default();
        assert!(empty_update.into_update().is_err());
    }
}
