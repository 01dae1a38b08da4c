//! crates/training_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Returned when a stored or submitted label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {kind}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

/// Generates `as_str`, `Display` and `FromStr` for enums that travel as text labels.
macro_rules! labelled_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseLabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    _ => Err(ParseLabelError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

//=========================================================================================
// Dogs
//=========================================================================================

/// A dog profile owned by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Dog {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_lbs: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Dog {
    /// Whole years since the date of birth, counting a year as 365 days.
    pub fn age_years(&self, today: NaiveDate) -> Option<u32> {
        let born = self.date_of_birth?;
        let days = today.signed_duration_since(born).num_days();
        if days < 0 {
            return Some(0);
        }
        u32::try_from(days / 365).ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDog {
    pub owner_id: Uuid,
    pub name: String,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_lbs: Option<f64>,
}

/// A partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DogUpdate {
    pub name: Option<String>,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_lbs: Option<f64>,
}

impl DogUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.breed.is_none()
            && self.date_of_birth.is_none()
            && self.weight_lbs.is_none()
    }
}

//=========================================================================================
// Training Plans
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

labelled_enum!(Difficulty, "difficulty", {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

/// Plan lifecycle stage. Variants are declared in lifecycle order so that the
/// derived `Ord` matches the only permitted direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlanStatus {
    NotStarted,
    InProgress,
    Completed,
}

labelled_enum!(PlanStatus, "plan status", {
    NotStarted => "not_started",
    InProgress => "in_progress",
    Completed => "completed",
});

impl PlanStatus {
    /// Transitions only move forward: not_started -> in_progress -> completed.
    pub fn can_advance_to(self, next: PlanStatus) -> bool {
        next > self
    }
}

/// A multi-week training program for one dog.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub dog_id: Uuid,
    pub title: String,
    pub description: String,
    pub behavior_to_correct: Option<String>,
    pub difficulty: Difficulty,
    pub duration_weeks: u32,
    pub sessions_per_week: u32,
    pub training_days: Vec<String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

/// A plan joined with the name of the dog it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanWithDog {
    pub plan: TrainingPlan,
    pub dog_name: String,
}

/// Everything needed to persist a plan and its steps in one atomic write.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainingPlan {
    pub dog_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub behavior_to_correct: Option<String>,
    pub difficulty: Difficulty,
    pub duration_weeks: u32,
    pub sessions_per_week: u32,
    pub training_days: Vec<String>,
    pub status: PlanStatus,
    pub steps: Vec<NewTrainingStep>,
}

//=========================================================================================
// Training Steps
//=========================================================================================

/// A single day's exercise within a plan. `day_number` orders steps but is not unique.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingStep {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub day_number: u32,
    pub duration_minutes: Option<u32>,
    pub video_url: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainingStep {
    pub title: String,
    pub description: String,
    pub day_number: u32,
    pub duration_minutes: u32,
}

//=========================================================================================
// Training Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DogMood {
    #[default]
    Happy,
    Excited,
    Calm,
    Anxious,
    Tired,
    Distracted,
}

labelled_enum!(DogMood, "dog mood", {
    Happy => "Happy",
    Excited => "Excited",
    Calm => "Calm",
    Anxious => "Anxious",
    Tired => "Tired",
    Distracted => "Distracted",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrainerMood {
    #[default]
    Confident,
    Patient,
    Frustrated,
    Tired,
}

labelled_enum!(TrainerMood, "trainer mood", {
    Confident => "Confident",
    Patient => "Patient",
    Frustrated => "Frustrated",
    Tired => "Tired",
});

/// Environment tags offered by the session form. Free-form tags are also accepted.
pub const SUGGESTED_ENVIRONMENTS: &[&str] = &[
    "Indoor",
    "Outdoor",
    "Quiet",
    "Noisy",
    "With other dogs",
    "With distractions",
];

/// The record of actually performing a step.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSession {
    pub id: Uuid,
    pub step_id: Uuid,
    pub dog_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub achievements: String,
    pub challenges: String,
    pub next_steps: String,
    pub duration_minutes: u32,
    pub repetitions: u32,
    pub environments: BTreeSet<String>,
    pub environment_notes: String,
    pub dog_mood: DogMood,
    pub rating: u8,
    pub treats_used: String,
    pub trainer_mood: TrainerMood,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainingSession {
    pub step_id: Uuid,
    pub dog_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub achievements: String,
    pub challenges: String,
    pub next_steps: String,
    pub duration_minutes: u32,
    pub repetitions: u32,
    pub environments: BTreeSet<String>,
    pub environment_notes: String,
    pub dog_mood: DogMood,
    pub rating: u8,
    pub treats_used: String,
    pub trainer_mood: TrainerMood,
}

//=========================================================================================
// Chat
//=========================================================================================

/// One chat turn: the user's text and the assistant's reply, stored together.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dog_born(date: Option<NaiveDate>) -> Dog {
        Dog {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Rex".to_string(),
            breed: None,
            date_of_birth: date,
            weight_lbs: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn age_is_floored_whole_years() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let dog = dog_born(NaiveDate::from_ymd_opt(2021, 3, 1));
        assert_eq!(dog.age_years(today), Some(3));
        assert_eq!(dog_born(None).age_years(today), None);
    }

    #[test]
    fn status_only_advances() {
        assert!(PlanStatus::NotStarted.can_advance_to(PlanStatus::InProgress));
        assert!(PlanStatus::InProgress.can_advance_to(PlanStatus::Completed));
        assert!(!PlanStatus::Completed.can_advance_to(PlanStatus::InProgress));
        assert!(!PlanStatus::Completed.can_advance_to(PlanStatus::NotStarted));
        assert!(!PlanStatus::InProgress.can_advance_to(PlanStatus::InProgress));
    }

    #[test]
    fn labels_parse_back() {
        assert_eq!("in_progress".parse::<PlanStatus>(), Ok(PlanStatus::InProgress));
        assert_eq!("Distracted".parse::<DogMood>(), Ok(DogMood::Distracted));
        let err = "expert".parse::<Difficulty>().unwrap_err();
        assert_eq!(err.kind, "difficulty");
    }
}
