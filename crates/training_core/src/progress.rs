//! crates/training_core/src/progress.rs
//!
//! Pure derivations over a plan's steps and sessions: completion percentage,
//! the step to work on next, the status to display, and summary statistics.

use crate::domain::{Difficulty, PlanStatus, TrainingPlan, TrainingSession, TrainingStep};

/// Percentage of completed steps, `0.0` for an empty plan.
pub fn progress(steps: &[TrainingStep]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    let completed = steps.iter().filter(|s| s.completed).count();
    100.0 * completed as f64 / steps.len() as f64
}

/// The first incomplete step by `day_number`, or the last step once all are done.
///
/// Ties on `day_number` resolve to sequence order, so for a collection already
/// sorted by day this is "first incomplete, else last".
pub fn current_step(steps: &[TrainingStep]) -> Option<&TrainingStep> {
    steps
        .iter()
        .filter(|s| !s.completed)
        .min_by_key(|s| s.day_number)
        .or_else(|| steps.iter().max_by_key(|s| s.day_number))
}

/// Index of the step a session view should open on when none was requested.
pub fn first_incomplete_index(steps: &[TrainingStep]) -> usize {
    steps.iter().position(|s| !s.completed).unwrap_or(0)
}

/// Status implied by the steps alone.
pub fn status_from_steps(steps: &[TrainingStep]) -> PlanStatus {
    if !steps.is_empty() && steps.iter().all(|s| s.completed) {
        PlanStatus::Completed
    } else if steps.iter().any(|s| s.completed) {
        PlanStatus::InProgress
    } else {
        PlanStatus::NotStarted
    }
}

/// The status to show for a plan: re-derived from its steps, but never behind
/// what was persisted.
pub fn display_status(persisted: PlanStatus, steps: &[TrainingStep]) -> PlanStatus {
    persisted.max(status_from_steps(steps))
}

//=========================================================================================
// Plan Statistics
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStats {
    pub progress_percentage: f64,
    pub average_rating: Option<f64>,
    pub total_sessions: usize,
}

/// Progress plus rating aggregates over the sessions recorded for a plan's steps.
pub fn plan_stats(steps: &[TrainingStep], sessions: &[TrainingSession]) -> PlanStats {
    let ratings: Vec<f64> = sessions
        .iter()
        .filter(|s| steps.iter().any(|step| step.id == s.step_id))
        .filter(|s| s.rating > 0)
        .map(|s| f64::from(s.rating))
        .collect();

    let average_rating = if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    };

    PlanStats {
        progress_percentage: progress(steps),
        average_rating,
        total_sessions: ratings.len(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    JustStarted,
    Excellent,
    Good,
    NeedsSupport,
}

impl PerformanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceStatus::JustStarted => "just_started",
            PerformanceStatus::Excellent => "excellent",
            PerformanceStatus::Good => "good",
            PerformanceStatus::NeedsSupport => "needs_support",
        }
    }
}

pub fn performance_status(average_rating: Option<f64>) -> PerformanceStatus {
    match average_rating {
        None => PerformanceStatus::JustStarted,
        Some(r) if r >= 4.0 => PerformanceStatus::Excellent,
        Some(r) if r >= 3.0 => PerformanceStatus::Good,
        Some(_) => PerformanceStatus::NeedsSupport,
    }
}

/// The hardest difficulty among completed plans; beginners until one is finished.
pub fn training_level<'a>(plans: impl IntoIterator<Item = &'a TrainingPlan>) -> Difficulty {
    plans
        .into_iter()
        .filter(|p| p.status == PlanStatus::Completed)
        .map(|p| p.difficulty)
        .max()
        .unwrap_or(Difficulty::Beginner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{plan, session_for, step};

    #[test]
    fn empty_plan_has_no_progress_and_no_current_step() {
        assert_eq!(progress(&[]), 0.0);
        assert!(current_step(&[]).is_none());
    }

    #[test]
    fn scenario_a_one_of_three_done() {
        let steps = vec![step(1, true), step(2, false), step(3, false)];
        let pct = progress(&steps);
        assert!((pct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(current_step(&steps).map(|s| s.day_number), Some(2));
    }

    #[test]
    fn scenario_b_all_done_points_at_last_day() {
        let steps = vec![step(1, true), step(2, true), step(3, true)];
        assert_eq!(progress(&steps), 100.0);
        assert_eq!(current_step(&steps).map(|s| s.day_number), Some(3));
    }

    #[test]
    fn current_step_follows_day_order_not_sequence_order() {
        let steps = vec![step(5, false), step(2, false), step(9, true)];
        assert_eq!(current_step(&steps).map(|s| s.day_number), Some(2));

        let done = vec![step(7, true), step(3, true)];
        assert_eq!(current_step(&done).map(|s| s.day_number), Some(7));
    }

    #[test]
    fn display_status_never_regresses() {
        let none_done = vec![step(1, false), step(2, false)];
        let all_done = vec![step(1, true), step(2, true)];

        assert_eq!(
            display_status(PlanStatus::Completed, &none_done),
            PlanStatus::Completed
        );
        assert_eq!(
            display_status(PlanStatus::InProgress, &all_done),
            PlanStatus::Completed
        );
        assert_eq!(display_status(PlanStatus::NotStarted, &[]), PlanStatus::NotStarted);
    }

    #[test]
    fn stats_average_only_rated_sessions_of_this_plan() {
        let steps = vec![step(1, true), step(2, true)];
        let stray = step(3, true);
        let sessions = vec![
            session_for(&steps[0], 5),
            session_for(&steps[1], 3),
            session_for(&stray, 1),
        ];

        let stats = plan_stats(&steps, &sessions);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.average_rating, Some(4.0));
        assert_eq!(performance_status(stats.average_rating), PerformanceStatus::Excellent);
        assert_eq!(performance_status(None), PerformanceStatus::JustStarted);
        assert_eq!(performance_status(Some(2.5)), PerformanceStatus::NeedsSupport);
    }

    #[test]
    fn training_level_uses_completed_plans_only() {
        let mut advanced = plan(PlanStatus::InProgress);
        advanced.difficulty = Difficulty::Advanced;
        let mut intermediate = plan(PlanStatus::Completed);
        intermediate.difficulty = Difficulty::Intermediate;

        assert_eq!(training_level([&advanced]), Difficulty::Beginner);
        assert_eq!(training_level([&advanced, &intermediate]), Difficulty::Intermediate);
    }
}
