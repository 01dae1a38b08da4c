//! crates/training_core/src/propagate.rs
//!
//! Plan status transitions driven by step completion, plus the explicit
//! "start training" transition. All transitions are forward-only.

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{PlanStatus, TrainingPlan, TrainingStep};
use crate::ports::{DatabaseService, PortError};
use crate::progress::display_status;

#[derive(Debug, thiserror::Error)]
pub enum PlanStatusError {
    #[error("Plan cannot move from {from} back to {to}")]
    Backward { from: PlanStatus, to: PlanStatus },
    #[error(transparent)]
    Port(#[from] PortError),
}

/// What the propagator did after a step was completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationOutcome {
    /// Some steps are still open; nothing was written.
    StepsRemaining,
    /// Every step is done and the plan was moved to `completed`.
    PlanCompleted,
    /// Every step is done but the status write failed. Logged only.
    UpdateFailed(String),
}

/// True when the plan has at least one step and all of them are completed.
pub fn all_steps_completed(steps: &[TrainingStep]) -> bool {
    !steps.is_empty() && steps.iter().all(|s| s.completed)
}

/// Replaces the step with the same id by the confirmed copy returned from the store.
/// Returns false when the step is not part of the collection.
pub fn substitute_step(steps: &mut [TrainingStep], updated: TrainingStep) -> bool {
    match steps.iter_mut().find(|s| s.id == updated.id) {
        Some(slot) => {
            *slot = updated;
            true
        }
        None => false,
    }
}

/// Moves the plan to `completed` when every step in `steps` is done.
///
/// `steps` must already contain the confirmed result of the step write that
/// triggered this call (see [`substitute_step`]). A failed status write never
/// rolls back the step and never surfaces as an error.
pub async fn propagate_plan_completion(
    db: &dyn DatabaseService,
    plan_id: Uuid,
    steps: &[TrainingStep],
) -> PropagationOutcome {
    if !all_steps_completed(steps) {
        return PropagationOutcome::StepsRemaining;
    }

    match db.update_plan_status(plan_id, PlanStatus::Completed).await {
        Ok(_) => {
            info!("All steps complete; plan {} marked completed.", plan_id);
            PropagationOutcome::PlanCompleted
        }
        Err(e) => {
            warn!(
                "All steps of plan {} are complete but the status update failed: {}",
                plan_id, e
            );
            PropagationOutcome::UpdateFailed(e.to_string())
        }
    }
}

/// Starts training on a plan. Already-started plans are returned unchanged;
/// completed plans are refused.
pub async fn start_plan(
    db: &dyn DatabaseService,
    plan: &TrainingPlan,
) -> Result<TrainingPlan, PlanStatusError> {
    match plan.status {
        PlanStatus::NotStarted => {
            let updated = db.update_plan_status(plan.id, PlanStatus::InProgress).await?;
            info!("Plan {} started.", plan.id);
            Ok(updated)
        }
        PlanStatus::InProgress => Ok(plan.clone()),
        PlanStatus::Completed => Err(PlanStatusError::Backward {
            from: PlanStatus::Completed,
            to: PlanStatus::InProgress,
        }),
    }
}

/// Brings a persisted status that lags behind its steps up to date.
///
/// Returns the status to display. The plan's status field is only updated when
/// the store confirms the write; a failure is logged and the derived status is
/// still returned for display.
pub async fn reconcile_plan_status(
    db: &dyn DatabaseService,
    plan: &mut TrainingPlan,
    steps: &[TrainingStep],
) -> PlanStatus {
    let derived = display_status(plan.status, steps);
    if !plan.status.can_advance_to(derived) {
        return derived;
    }

    match db.update_plan_status(plan.id, derived).await {
        Ok(updated) => {
            info!(
                "Reconciled plan {} status from {} to {}.",
                plan.id, plan.status, updated.status
            );
            plan.status = updated.status;
        }
        Err(e) => warn!(
            "Could not reconcile plan {} status to {}: {}",
            plan.id, derived, e
        ),
    }
    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{plan, step_in, InMemoryStore};

    #[tokio::test]
    async fn completing_final_step_completes_plan() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, true), step_in(p.id, 2, true), step_in(p.id, 3, true)];
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());

        let outcome = propagate_plan_completion(&store, p.id, &steps).await;

        assert_eq!(outcome, PropagationOutcome::PlanCompleted);
        assert_eq!(store.state().status_updates, vec![(p.id, PlanStatus::Completed)]);
    }

    #[tokio::test]
    async fn open_steps_issue_no_write() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, true), step_in(p.id, 2, false)];
        let store = InMemoryStore::default();
        store.insert_plan(p.clone(), "Rex", steps.clone());

        let outcome = propagate_plan_completion(&store, p.id, &steps).await;

        assert_eq!(outcome, PropagationOutcome::StepsRemaining);
        assert!(store.state().status_updates.is_empty());
    }

    #[tokio::test]
    async fn failed_status_write_is_swallowed() {
        let p = plan(PlanStatus::InProgress);
        let steps = vec![step_in(p.id, 1, true)];
        let store = InMemoryStore::with(|s| s.fail_status_update = true);
        store.insert_plan(p.clone(), "Rex", steps.clone());

        let outcome = propagate_plan_completion(&store, p.id, &steps).await;

        assert!(matches!(outcome, PropagationOutcome::UpdateFailed(_)));
        assert_eq!(store.state().plans[0].plan.status, PlanStatus::InProgress);
    }

    #[test]
    fn substitution_uses_confirmed_copy() {
        let plan_id = Uuid::new_v4();
        let mut steps = vec![step_in(plan_id, 1, true), step_in(plan_id, 2, false)];
        let mut confirmed = steps[1].clone();
        confirmed.completed = true;

        assert!(!all_steps_completed(&steps));
        assert!(substitute_step(&mut steps, confirmed));
        assert!(all_steps_completed(&steps));
        assert!(!substitute_step(&mut steps, step_in(plan_id, 3, true)));
        assert!(!all_steps_completed(&[]));
    }

    #[tokio::test]
    async fn start_is_forward_only() {
        let fresh = plan(PlanStatus::NotStarted);
        let done = plan(PlanStatus::Completed);
        let store = InMemoryStore::default();
        store.insert_plan(fresh.clone(), "Rex", vec![]);
        store.insert_plan(done.clone(), "Rex", vec![]);

        let started = start_plan(&store, &fresh).await.unwrap();
        assert_eq!(started.status, PlanStatus::InProgress);

        let again = start_plan(&store, &started).await.unwrap();
        assert_eq!(again.status, PlanStatus::InProgress);
        assert_eq!(store.state().status_updates.len(), 1);

        let refused = start_plan(&store, &done).await;
        assert!(matches!(refused, Err(PlanStatusError::Backward { .. })));
    }

    #[tokio::test]
    async fn stale_start_does_not_reopen_completed_plan() {
        let stored = plan(PlanStatus::Completed);
        let store = InMemoryStore::default();
        store.insert_plan(stored.clone(), "Rex", vec![]);
        let mut stale = stored.clone();
        stale.status = PlanStatus::NotStarted;

        let returned = start_plan(&store, &stale).await.unwrap();

        assert_eq!(returned.status, PlanStatus::Completed);
        assert_eq!(store.state().plans[0].plan.status, PlanStatus::Completed);
    }

    #[tokio::test]
    async fn reconcile_lifts_lagging_status_and_never_lowers_it() {
        let mut lagging = plan(PlanStatus::InProgress);
        let lagging_steps = vec![step_in(lagging.id, 1, true), step_in(lagging.id, 2, true)];
        let mut finished = plan(PlanStatus::Completed);
        let finished_steps = vec![step_in(finished.id, 1, false)];
        let store = InMemoryStore::default();
        store.insert_plan(lagging.clone(), "Rex", lagging_steps.clone());
        store.insert_plan(finished.clone(), "Rex", finished_steps.clone());

        let shown = reconcile_plan_status(&store, &mut lagging, &lagging_steps).await;
        assert_eq!(shown, PlanStatus::Completed);
        assert_eq!(lagging.status, PlanStatus::Completed);

        let shown = reconcile_plan_status(&store, &mut finished, &finished_steps).await;
        assert_eq!(shown, PlanStatus::Completed);
        assert_eq!(store.state().status_updates.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_failure_keeps_persisted_status() {
        let mut lagging = plan(PlanStatus::InProgress);
        let steps = vec![step_in(lagging.id, 1, true)];
        let store = InMemoryStore::with(|s| s.fail_status_update = true);
        store.insert_plan(lagging.clone(), "Rex", steps.clone());

        let shown = reconcile_plan_status(&store, &mut lagging, &steps).await;
        assert_eq!(shown, PlanStatus::Completed);
        assert_eq!(lagging.status, PlanStatus::InProgress);
    }
}
