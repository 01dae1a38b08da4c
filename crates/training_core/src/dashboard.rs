//! crates/training_core/src/dashboard.rs
//!
//! Read-side views: the home dashboard, the grouped plan list and a single plan
//! with its steps. Every load re-derives status from steps and reconciles drift.

use futures::future::try_join_all;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{PlanStatus, PlanWithDog, TrainingStep};
use crate::ports::{DatabaseService, PortResult};
use crate::progress::{current_step, progress};
use crate::propagate::reconcile_plan_status;

/// A plan together with everything derived from its steps.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOverview {
    pub plan: PlanWithDog,
    pub steps: Vec<TrainingStep>,
    pub progress: f64,
    pub current_step: Option<TrainingStep>,
    pub display_status: PlanStatus,
}

async fn overview(db: &dyn DatabaseService, mut plan: PlanWithDog) -> PortResult<PlanOverview> {
    let steps = db.get_steps_for_plan(plan.plan.id).await?;
    let display_status = reconcile_plan_status(db, &mut plan.plan, &steps).await;
    Ok(PlanOverview {
        progress: progress(&steps),
        current_step: current_step(&steps).cloned(),
        display_status,
        plan,
        steps,
    })
}

async fn overviews(
    db: &dyn DatabaseService,
    plans: Vec<PlanWithDog>,
) -> PortResult<Vec<PlanOverview>> {
    try_join_all(plans.into_iter().map(|p| overview(db, p))).await
}

//=========================================================================================
// Dashboard
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub plans: Vec<PlanOverview>,
    /// Progress across the steps of every active plan together.
    pub overall_progress: f64,
    pub current_step: Option<TrainingStep>,
}

/// Active plans of a user with their steps. One failed step fetch fails the whole load.
pub async fn load_dashboard(db: &dyn DatabaseService, user_id: Uuid) -> PortResult<Dashboard> {
    let active: Vec<PlanWithDog> = db
        .get_plans_by_user(user_id)
        .await?
        .into_iter()
        .filter(|p| p.plan.status == PlanStatus::InProgress)
        .collect();
    debug!("Loading dashboard for user {} with {} active plan(s)", user_id, active.len());

    let plans = overviews(db, active).await?;
    let all_steps: Vec<TrainingStep> = plans.iter().flat_map(|p| p.steps.clone()).collect();

    Ok(Dashboard {
        overall_progress: progress(&all_steps),
        current_step: current_step(&all_steps).cloned(),
        plans,
    })
}

//=========================================================================================
// Plan List
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanGroups {
    pub active: Vec<PlanOverview>,
    pub completed: Vec<PlanOverview>,
    pub not_started: Vec<PlanOverview>,
}

pub fn group_plans(plans: Vec<PlanOverview>) -> PlanGroups {
    let mut groups = PlanGroups::default();
    for plan in plans {
        match plan.display_status {
            PlanStatus::InProgress => groups.active.push(plan),
            PlanStatus::Completed => groups.completed.push(plan),
            PlanStatus::NotStarted => groups.not_started.push(plan),
        }
    }
    groups
}

/// All plans of a user, grouped by displayed status. When `email` is given the
/// user's profile row is created or refreshed first.
pub async fn load_plans(
    db: &dyn DatabaseService,
    user_id: Uuid,
    email: Option<&str>,
) -> PortResult<PlanGroups> {
    if let Some(email) = email {
        db.ensure_profile(user_id, email).await?;
    }
    let plans = db.get_plans_by_user(user_id).await?;
    Ok(group_plans(overviews(db, plans).await?))
}

/// A single plan with its ordered steps, or `None` when it does not exist.
pub async fn load_plan_detail(
    db: &dyn DatabaseService,
    plan_id: Uuid,
) -> PortResult<Option<PlanOverview>> {
    let (plan, steps) = futures::try_join!(
        db.get_plan_by_id(plan_id),
        db.get_steps_for_plan(plan_id)
    )?;
    let Some(mut plan) = plan else {
        return Ok(None);
    };
    let display_status = reconcile_plan_status(db, &mut plan.plan, &steps).await;
    Ok(Some(PlanOverview {
        progress: progress(&steps),
        current_step: current_step(&steps).cloned(),
        display_status,
        plan,
        steps,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{plan, step_in, InMemoryStore};

    fn seed(store: &InMemoryStore, user: Uuid, status: PlanStatus, done: &[bool]) -> Uuid {
        let mut p = plan(status);
        p.user_id = user;
        let steps = done
            .iter()
            .enumerate()
            .map(|(i, c)| step_in(p.id, i as u32 + 1, *c))
            .collect();
        let id = p.id;
        store.insert_plan(p, "Rex", steps);
        id
    }

    #[tokio::test]
    async fn dashboard_aggregates_active_plans_only() {
        let user = Uuid::new_v4();
        let store = InMemoryStore::default();
        seed(&store, user, PlanStatus::InProgress, &[true, false]);
        seed(&store, user, PlanStatus::InProgress, &[true, true, false, false]);
        seed(&store, user, PlanStatus::NotStarted, &[false, false]);

        let dashboard = load_dashboard(&store, user).await.unwrap();

        assert_eq!(dashboard.plans.len(), 2);
        assert_eq!(dashboard.overall_progress, 50.0);
        assert_eq!(dashboard.current_step.map(|s| s.day_number), Some(2));
    }

    #[tokio::test]
    async fn one_failed_fetch_fails_the_dashboard() {
        let user = Uuid::new_v4();
        let store = InMemoryStore::default();
        seed(&store, user, PlanStatus::InProgress, &[true]);
        let broken = seed(&store, user, PlanStatus::InProgress, &[false]);
        store.state().fail_steps_for = Some(broken);

        assert!(load_dashboard(&store, user).await.is_err());
    }

    #[tokio::test]
    async fn listing_groups_by_derived_status_and_heals_drift() {
        let user = Uuid::new_v4();
        let store = InMemoryStore::default();
        let drifted = seed(&store, user, PlanStatus::InProgress, &[true, true]);
        seed(&store, user, PlanStatus::NotStarted, &[false]);
        seed(&store, user, PlanStatus::InProgress, &[true, false]);

        let groups = load_plans(&store, user, Some("owner@example.com")).await.unwrap();

        assert_eq!(groups.completed.len(), 1);
        assert_eq!(groups.completed[0].plan.plan.id, drifted);
        assert_eq!(groups.completed[0].plan.plan.status, PlanStatus::Completed);
        assert_eq!(groups.active.len(), 1);
        assert_eq!(groups.not_started.len(), 1);
        assert_eq!(store.state().status_updates, vec![(drifted, PlanStatus::Completed)]);
        assert_eq!(store.state().profiles.len(), 1);
    }

    #[tokio::test]
    async fn missing_plan_is_none() {
        let store = InMemoryStore::default();
        assert!(load_plan_detail(&store, Uuid::new_v4()).await.unwrap().is_none());

        let user = Uuid::new_v4();
        let id = seed(&store, user, PlanStatus::InProgress, &[true, false, false]);
        let detail = load_plan_detail(&store, id).await.unwrap().unwrap();
        assert_eq!(detail.steps.len(), 3);
        assert_eq!(detail.current_step.map(|s| s.day_number), Some(2));
        assert_eq!(detail.display_status, PlanStatus::InProgress);
    }
}
