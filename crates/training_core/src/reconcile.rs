//! crates/training_core/src/reconcile.rs
//!
//! State behind the training-session screen: which step is active, whether a
//! session has already been recorded for it, and whether the form is editable.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{DogMood, NewTrainingSession, TrainerMood, TrainingSession, TrainingStep};
use crate::ports::{DatabaseService, PortError};
use crate::progress::first_incomplete_index;
use crate::propagate::{propagate_plan_completion, substitute_step, PropagationOutcome};

pub const DEFAULT_DURATION_MINUTES: u32 = 15;
pub const DEFAULT_RATING: u8 = 3;
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

//=========================================================================================
// Session Form
//=========================================================================================

/// The editable shape of a training session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionForm {
    pub achievements: String,
    pub challenges: String,
    pub duration_minutes: u32,
    pub repetitions: u32,
    pub environments: BTreeSet<String>,
    pub environment_notes: String,
    pub dog_mood: DogMood,
    pub rating: u8,
    pub treats_used: String,
    pub trainer_mood: TrainerMood,
    pub next_steps: String,
}

impl Default for SessionForm {
    fn default() -> Self {
        Self {
            achievements: String::new(),
            challenges: String::new(),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            repetitions: 0,
            environments: BTreeSet::new(),
            environment_notes: String::new(),
            dog_mood: DogMood::default(),
            rating: DEFAULT_RATING,
            treats_used: String::new(),
            trainer_mood: TrainerMood::default(),
            next_steps: String::new(),
        }
    }
}

/// Field name -> message for every invalid field of a submitted form.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("session form has {} invalid field(s)", .fields.len())]
pub struct SessionFormErrors {
    pub fields: BTreeMap<&'static str, String>,
}

impl SessionFormErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

impl SessionForm {
    pub fn from_session(session: &TrainingSession) -> Self {
        Self {
            achievements: session.achievements.clone(),
            challenges: session.challenges.clone(),
            duration_minutes: session.duration_minutes,
            repetitions: session.repetitions,
            environments: session.environments.clone(),
            environment_notes: session.environment_notes.clone(),
            dog_mood: session.dog_mood,
            rating: session.rating,
            treats_used: session.treats_used.clone(),
            trainer_mood: session.trainer_mood,
            next_steps: session.next_steps.clone(),
        }
    }

    /// Checks the required fields. Nothing is written when this fails.
    pub fn validate(&self) -> Result<(), SessionFormErrors> {
        let mut errors = SessionFormErrors::default();

        if self.achievements.trim().is_empty() {
            errors
                .fields
                .insert("achievements", "Please enter achievements".to_string());
        }
        if self.challenges.trim().is_empty() {
            errors
                .fields
                .insert("challenges", "Please enter any challenges".to_string());
        }
        if self.duration_minutes < 1 {
            errors.fields.insert(
                "duration_minutes",
                "Duration must be at least 1 minute".to_string(),
            );
        }
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            errors.fields.insert(
                "rating",
                format!("Rating must be between {MIN_RATING} and {MAX_RATING}"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_new_session(
        &self,
        step_id: Uuid,
        dog_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> NewTrainingSession {
        NewTrainingSession {
            step_id,
            dog_id,
            completed_at,
            achievements: self.achievements.trim().to_string(),
            challenges: self.challenges.trim().to_string(),
            next_steps: self.next_steps.trim().to_string(),
            duration_minutes: self.duration_minutes,
            repetitions: self.repetitions,
            environments: self.environments.clone(),
            environment_notes: self.environment_notes.clone(),
            dog_mood: self.dog_mood,
            rating: self.rating,
            treats_used: self.treats_used.clone(),
            trainer_mood: self.trainer_mood,
        }
    }
}

//=========================================================================================
// Session View
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Editable,
    ReadOnly,
}

/// Result of the most recent "is there already a session for this step" query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupState {
    NotLoaded,
    Found,
    NotFound,
    /// The store could not be reached. The form stays editable and the lookup
    /// can be retried with [`SessionView::refresh`].
    Failed(String),
}

impl LookupState {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LookupState::Failed(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Step index {index} is out of range for a plan with {len} steps")]
    NoSuchStep { index: usize, len: usize },
    #[error("No session has been recorded for this step yet")]
    NoSavedSession,
    #[error("The session is shown read-only; switch to edit mode first")]
    ReadOnly,
    #[error(transparent)]
    Validation(#[from] SessionFormErrors),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Returned after a session has been recorded for the active step.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub session: TrainingSession,
    pub step: TrainingStep,
    pub propagation: PropagationOutcome,
}

/// The training-session screen for one plan.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub plan_id: Uuid,
    pub dog_id: Uuid,
    pub steps: Vec<TrainingStep>,
    pub current_index: usize,
    pub form: SessionForm,
    pub saved_session: Option<TrainingSession>,
    pub mode: ViewMode,
    pub lookup: LookupState,
}

impl SessionView {
    /// Opens on `requested_index`, or on the first incomplete step when none is given.
    /// Call [`SessionView::activate`] to run the session lookup.
    pub fn new(
        plan_id: Uuid,
        dog_id: Uuid,
        steps: Vec<TrainingStep>,
        requested_index: Option<usize>,
    ) -> Self {
        let current_index = requested_index.unwrap_or_else(|| first_incomplete_index(&steps));
        Self {
            plan_id,
            dog_id,
            steps,
            current_index,
            form: SessionForm::default(),
            saved_session: None,
            mode: ViewMode::Editable,
            lookup: LookupState::NotLoaded,
        }
    }

    pub fn current_step(&self) -> Option<&TrainingStep> {
        self.steps.get(self.current_index)
    }

    /// Makes `index` the active step and reconciles it against the store.
    pub async fn activate(
        &mut self,
        db: &dyn DatabaseService,
        index: usize,
    ) -> Result<ViewMode, ReconcileError> {
        if index >= self.steps.len() {
            return Err(ReconcileError::NoSuchStep {
                index,
                len: self.steps.len(),
            });
        }
        if index != self.current_index {
            self.current_index = index;
            self.form = SessionForm::default();
            self.saved_session = None;
        }
        self.refresh(db).await
    }

    /// Re-runs the session lookup for the active step.
    pub async fn refresh(&mut self, db: &dyn DatabaseService) -> Result<ViewMode, ReconcileError> {
        let index = self.current_index;
        let step_id = self
            .steps
            .get(index)
            .map(|s| s.id)
            .ok_or(ReconcileError::NoSuchStep {
                index,
                len: self.steps.len(),
            })?;

        match db.get_latest_session_for_step(step_id).await {
            Ok(Some(session)) => {
                debug!("Found saved session {} for step {}", session.id, step_id);
                // Read-only always shows the recorded values, discarding unsaved edits.
                self.form = SessionForm::from_session(&session);
                self.saved_session = Some(session);
                if !self.steps[index].completed {
                    info!(
                        "Step {} has a recorded session but was not marked completed; healing locally.",
                        step_id
                    );
                    self.steps[index].completed = true;
                }
                self.mode = ViewMode::ReadOnly;
                self.lookup = LookupState::Found;
            }
            Ok(None) => {
                debug!("No saved session for step {}", step_id);
                self.form = SessionForm::default();
                self.saved_session = None;
                self.mode = ViewMode::Editable;
                self.lookup = LookupState::NotFound;
            }
            Err(e) => {
                warn!("Error loading saved session for step {}: {}", step_id, e);
                self.mode = ViewMode::Editable;
                self.lookup = LookupState::Failed(e.to_string());
            }
        }
        Ok(self.mode)
    }

    /// The explicit "Edit" action. Only available once a session exists.
    pub fn toggle_edit(&mut self) -> Result<ViewMode, ReconcileError> {
        if self.saved_session.is_none() {
            return Err(ReconcileError::NoSavedSession);
        }
        self.mode = match self.mode {
            ViewMode::ReadOnly => ViewMode::Editable,
            ViewMode::Editable => ViewMode::ReadOnly,
        };
        Ok(self.mode)
    }

    /// Validates the form, records a session for the active step, marks the step
    /// completed and propagates plan completion.
    ///
    /// Editing a previously recorded session appends a new record; the newest one
    /// is what later lookups return.
    pub async fn submit(
        &mut self,
        db: &dyn DatabaseService,
        completed_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, ReconcileError> {
        if self.mode == ViewMode::ReadOnly {
            return Err(ReconcileError::ReadOnly);
        }
        let step_id = self
            .current_step()
            .map(|s| s.id)
            .ok_or(ReconcileError::NoSuchStep {
                index: self.current_index,
                len: self.steps.len(),
            })?;
        self.form.validate()?;

        let new_session = self.form.to_new_session(step_id, self.dog_id, completed_at);
        let session = db.create_session(new_session).await?;
        info!("Training session {} recorded for step {}", session.id, step_id);

        let confirmed = db.update_step_completed(step_id, true).await?;
        substitute_step(&mut self.steps, confirmed.clone());

        let propagation = propagate_plan_completion(db, self.plan_id, &self.steps).await;

        self.form = SessionForm::from_session(&session);
        self.saved_session = Some(session.clone());
        self.mode = ViewMode::ReadOnly;
        self.lookup = LookupState::Found;

        Ok(SubmitOutcome {
            session,
            step: confirmed,
            propagation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlanStatus;
    use crate::testing::{plan, session_for, step_in, InMemoryStore};

    fn filled_form() -> SessionForm {
        SessionForm {
            achievements: "Sat on cue".into(),
            challenges: "Lost focus near the gate".into(),
            duration_minutes: 12,
            rating: 4,
            ..SessionForm::default()
        }
    }

    #[test]
    fn validation_reports_each_field() {
        let form = SessionForm {
            achievements: "   ".into(),
            challenges: String::new(),
            duration_minutes: 0,
            rating: 6,
            ..SessionForm::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.fields.len(), 4);
        assert_eq!(errors.get("achievements"), Some("Please enter achievements"));
        assert_eq!(errors.get("rating"), Some("Rating must be between 1 and 5"));
        assert!(filled_form().validate().is_ok());
    }

    #[tokio::test]
    async fn existing_session_switches_to_read_only_and_heals_step() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, false), step_in(p.id, 2, false)];
        let saved = session_for(&steps[0], 5);
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());
        store.state().sessions.push(saved.clone());

        let mut view = SessionView::new(p.id, p.dog_id, steps, None);
        let mode = view.activate(&store, 0).await.unwrap();

        assert_eq!(mode, ViewMode::ReadOnly);
        assert!(view.steps[0].completed);
        assert_eq!(view.form, SessionForm::from_session(&saved));
        assert_eq!(view.lookup, LookupState::Found);
    }

    #[tokio::test]
    async fn missing_session_leaves_defaults_editable() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, false)];
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());

        let mut view = SessionView::new(p.id, p.dog_id, steps, None);
        let mode = view.activate(&store, 0).await.unwrap();

        assert_eq!(mode, ViewMode::Editable);
        assert_eq!(view.form, SessionForm::default());
        assert!(matches!(view.toggle_edit(), Err(ReconcileError::NoSavedSession)));
    }

    #[tokio::test]
    async fn lookup_twice_gives_same_mode() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, true), step_in(p.id, 2, false)];
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());
        store.state().sessions.push(session_for(&steps[0], 4));

        let mut view = SessionView::new(p.id, p.dog_id, steps, Some(0));
        let first = view.activate(&store, 0).await.unwrap();
        let second = view.activate(&store, 0).await.unwrap();
        assert_eq!(first, second);

        let open_first = view.activate(&store, 1).await.unwrap();
        let open_second = view.activate(&store, 1).await.unwrap();
        assert_eq!(open_first, open_second);
        assert_eq!(store.state().session_lookups, 4);
    }

    #[tokio::test]
    async fn transport_failure_is_retryable_not_silent() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, false)];
        let store = InMemoryStore::with(|s| s.fail_session_lookup = true);
        store.insert_plan(p.clone(), "Rex", steps.clone());
        store.state().sessions.push(session_for(&steps[0], 4));

        let mut view = SessionView::new(p.id, p.dog_id, steps, None);
        assert_eq!(view.activate(&store, 0).await.unwrap(), ViewMode::Editable);
        assert!(view.lookup.is_retryable());

        store.state().fail_session_lookup = false;
        assert_eq!(view.refresh(&store).await.unwrap(), ViewMode::ReadOnly);
        assert_eq!(view.lookup, LookupState::Found);
    }

    #[tokio::test]
    async fn scenario_d_empty_achievements_blocks_write() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, false)];
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());

        let mut view = SessionView::new(p.id, p.dog_id, steps, None);
        view.activate(&store, 0).await.unwrap();
        view.form = SessionForm {
            achievements: String::new(),
            ..filled_form()
        };

        let err = view.submit(&store, Utc::now()).await.unwrap_err();
        match err {
            ReconcileError::Validation(errors) => {
                assert!(errors.get("achievements").is_some());
                assert_eq!(errors.fields.len(), 1);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(store.state().sessions.is_empty());
        assert!(!store.state().steps[0].completed);
    }

    #[tokio::test]
    async fn submitting_last_step_completes_plan() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, true), step_in(p.id, 2, true), step_in(p.id, 3, false)];
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());

        let mut view = SessionView::new(p.id, p.dog_id, steps, None);
        assert_eq!(view.current_index, 2);
        view.activate(&store, 2).await.unwrap();
        view.form = filled_form();

        let outcome = view.submit(&store, Utc::now()).await.unwrap();

        assert_eq!(outcome.propagation, PropagationOutcome::PlanCompleted);
        assert!(outcome.step.completed);
        assert_eq!(view.mode, ViewMode::ReadOnly);
        assert_eq!(store.state().plans[0].plan.status, PlanStatus::Completed);
        assert_eq!(store.state().sessions.len(), 1);
    }

    #[tokio::test]
    async fn read_only_view_refuses_submit_until_edit() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, true), step_in(p.id, 2, false)];
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());
        store.state().sessions.push(session_for(&steps[0], 2));

        let mut view = SessionView::new(p.id, p.dog_id, steps, Some(0));
        view.activate(&store, 0).await.unwrap();
        assert!(matches!(
            view.submit(&store, Utc::now()).await,
            Err(ReconcileError::ReadOnly)
        ));

        assert_eq!(view.toggle_edit().unwrap(), ViewMode::Editable);
        view.form.rating = 5;
        let outcome = view.submit(&store, Utc::now()).await.unwrap();
        assert_eq!(outcome.session.rating, 5);
        assert_eq!(outcome.propagation, PropagationOutcome::StepsRemaining);
        assert_eq!(store.state().sessions.len(), 2);
    }

    #[tokio::test]
    async fn refresh_discards_unsaved_edits() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, true)];
        let saved = session_for(&steps[0], 4);
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());
        store.state().sessions.push(saved.clone());

        let mut view = SessionView::new(p.id, p.dog_id, steps, Some(0));
        view.activate(&store, 0).await.unwrap();
        assert_eq!(view.toggle_edit().unwrap(), ViewMode::Editable);
        view.form.rating = 1;
        view.form.achievements = "Not saved yet".into();

        assert_eq!(view.refresh(&store).await.unwrap(), ViewMode::ReadOnly);
        assert_eq!(view.form, SessionForm::from_session(&saved));
        assert_eq!(view.saved_session.as_ref(), Some(&saved));
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let store = InMemoryStore::default();
        let mut view = SessionView::new(Uuid::new_v4(), Uuid::new_v4(), vec![], None);
        assert!(matches!(
            view.activate(&store, 0).await,
            Err(ReconcileError::NoSuchStep { index: 0, len: 0 })
        ));
    }
}
