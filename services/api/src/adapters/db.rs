//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use training_core::domain::{
    ChatMessage, Dog, DogUpdate, NewDog, NewTrainingPlan, NewTrainingSession, PlanWithDog,
    TrainingPlan, TrainingSession, TrainingStep,
};
use training_core::ports::{DatabaseService, PortError, PortResult};
use training_core::PlanStatus;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn parse_label<T>(value: &str) -> PortResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("Corrupt row: {}", e)))
}

fn to_u32(value: i32) -> u32 {
    value.max(0) as u32
}

fn to_i32(value: u32, column: &str) -> PortResult<i32> {
    i32::try_from(value)
        .map_err(|_| PortError::Unexpected(format!("{column} value {value} is out of range")))
}

const STATUS_ORDER: [PlanStatus; 3] = [
    PlanStatus::NotStarted,
    PlanStatus::InProgress,
    PlanStatus::Completed,
];

/// A SQL expression ranking a status label by its position in the plan lifecycle.
fn status_rank_sql(expr: &str) -> String {
    let arms: String = STATUS_ORDER
        .iter()
        .enumerate()
        .map(|(rank, status)| format!(" WHEN '{}' THEN {}", status.as_str(), rank))
        .collect();
    format!("(CASE {expr}{arms} END)")
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const DOG_COLUMNS: &str = "id, owner_id, name, breed, date_of_birth, weight_lbs, created_at";

#[derive(FromRow)]
struct DogRecord {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    breed: Option<String>,
    date_of_birth: Option<NaiveDate>,
    weight_lbs: Option<f64>,
    created_at: DateTime<Utc>,
}
impl DogRecord {
    fn to_domain(self) -> Dog {
        Dog {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            breed: self.breed,
            date_of_birth: self.date_of_birth,
            weight_lbs: self.weight_lbs,
            created_at: self.created_at,
        }
    }
}

const PLAN_COLUMNS: &str = "p.id, p.user_id, p.dog_id, p.title, p.description, \
    p.behavior_to_correct, p.difficulty, p.duration_weeks, p.sessions_per_week, \
    p.training_days, p.status, p.created_at";

#[derive(FromRow)]
struct PlanRecord {
    id: Uuid,
    user_id: Uuid,
    dog_id: Uuid,
    title: String,
    description: String,
    behavior_to_correct: Option<String>,
    difficulty: String,
    duration_weeks: i32,
    sessions_per_week: i32,
    training_days: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
}
impl PlanRecord {
    fn to_domain(self) -> PortResult<TrainingPlan> {
        Ok(TrainingPlan {
            id: self.id,
            user_id: self.user_id,
            dog_id: self.dog_id,
            title: self.title,
            description: self.description,
            behavior_to_correct: self.behavior_to_correct,
            difficulty: parse_label(&self.difficulty)?,
            duration_weeks: to_u32(self.duration_weeks),
            sessions_per_week: to_u32(self.sessions_per_week),
            training_days: self.training_days,
            status: parse_label(&self.status)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct PlanWithDogRecord {
    #[sqlx(flatten)]
    plan: PlanRecord,
    dog_name: String,
}
impl PlanWithDogRecord {
    fn to_domain(self) -> PortResult<PlanWithDog> {
        Ok(PlanWithDog {
            plan: self.plan.to_domain()?,
            dog_name: self.dog_name,
        })
    }
}

const STEP_COLUMNS: &str =
    "id, plan_id, title, description, day_number, duration_minutes, video_url, completed";

#[derive(FromRow)]
struct StepRecord {
    id: Uuid,
    plan_id: Uuid,
    title: String,
    description: Option<String>,
    day_number: i32,
    duration_minutes: Option<i32>,
    video_url: Option<String>,
    completed: bool,
}
impl StepRecord {
    fn to_domain(self) -> TrainingStep {
        TrainingStep {
            id: self.id,
            plan_id: self.plan_id,
            title: self.title,
            description: self.description,
            day_number: to_u32(self.day_number),
            duration_minutes: self.duration_minutes.map(to_u32),
            video_url: self.video_url,
            completed: self.completed,
        }
    }
}

const SESSION_COLUMNS: &str = "ts.id, ts.step_id, ts.dog_id, ts.completed_at, ts.achievements, \
    ts.challenges, ts.next_steps, ts.duration_minutes, ts.repetitions, ts.environments, \
    ts.environment_notes, ts.dog_mood, ts.rating, ts.treats_used, ts.trainer_mood";

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    step_id: Uuid,
    dog_id: Uuid,
    completed_at: DateTime<Utc>,
    achievements: String,
    challenges: String,
    next_steps: String,
    duration_minutes: i32,
    repetitions: i32,
    environments: Vec<String>,
    environment_notes: String,
    dog_mood: String,
    rating: i16,
    treats_used: String,
    trainer_mood: String,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<TrainingSession> {
        Ok(TrainingSession {
            id: self.id,
            step_id: self.step_id,
            dog_id: self.dog_id,
            completed_at: self.completed_at,
            achievements: self.achievements,
            challenges: self.challenges,
            next_steps: self.next_steps,
            duration_minutes: to_u32(self.duration_minutes),
            repetitions: to_u32(self.repetitions),
            environments: self.environments.into_iter().collect(),
            environment_notes: self.environment_notes,
            dog_mood: parse_label(&self.dog_mood)?,
            rating: self.rating.clamp(0, u8::MAX as i16) as u8,
            treats_used: self.treats_used,
            trainer_mood: parse_label(&self.trainer_mood)?,
        })
    }
}

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    user_id: Uuid,
    message: String,
    ai_response: String,
    created_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            user_id: self.user_id,
            message: self.message,
            ai_response: self.ai_response,
            created_at: self.created_at,
        }
    }
}

fn sessions_to_domain(records: Vec<SessionRecord>) -> PortResult<Vec<TrainingSession>> {
    records.into_iter().map(SessionRecord::to_domain).collect()
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn ensure_profile(&self, user_id: Uuid, email: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO profiles (id, email) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email",
        )
        .bind(user_id)
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    // --- Dogs ---

    async fn create_dog(&self, dog: NewDog) -> PortResult<Dog> {
        let record = sqlx::query_as::<_, DogRecord>(&format!(
            "INSERT INTO dogs (id, owner_id, name, breed, date_of_birth, weight_lbs) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DOG_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(dog.owner_id)
        .bind(dog.name)
        .bind(dog.breed)
        .bind(dog.date_of_birth)
        .bind(dog.weight_lbs)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_dogs_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Dog>> {
        let records = sqlx::query_as::<_, DogRecord>(&format!(
            "SELECT {DOG_COLUMNS} FROM dogs WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_dog_by_id(&self, dog_id: Uuid) -> PortResult<Option<Dog>> {
        let record = sqlx::query_as::<_, DogRecord>(&format!(
            "SELECT {DOG_COLUMNS} FROM dogs WHERE id = $1"
        ))
        .bind(dog_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn update_dog(&self, dog_id: Uuid, update: DogUpdate) -> PortResult<Dog> {
        let record = sqlx::query_as::<_, DogRecord>(&format!(
            "UPDATE dogs SET name = COALESCE($2, name), breed = COALESCE($3, breed), \
             date_of_birth = COALESCE($4, date_of_birth), weight_lbs = COALESCE($5, weight_lbs) \
             WHERE id = $1 RETURNING {DOG_COLUMNS}"
        ))
        .bind(dog_id)
        .bind(update.name)
        .bind(update.breed)
        .bind(update.date_of_birth)
        .bind(update.weight_lbs)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Dog {} not found", dog_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_dog(&self, dog_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query(
            "DELETE FROM training_steps WHERE plan_id IN \
             (SELECT id FROM training_plans WHERE dog_id = $1)",
        )
        .bind(dog_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        sqlx::query("DELETE FROM dogs WHERE id = $1")
            .bind(dog_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    // --- Training Plans ---

    async fn create_plan(&self, plan: NewTrainingPlan) -> PortResult<PlanWithDog> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let dog_name = sqlx::query_scalar::<_, String>("SELECT name FROM dogs WHERE id = $1")
            .bind(plan.dog_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Dog {} not found", plan.dog_id)))?;

        let record = sqlx::query_as::<_, PlanRecord>(&format!(
            "INSERT INTO training_plans AS p (id, user_id, dog_id, title, description, \
             behavior_to_correct, difficulty, duration_weeks, sessions_per_week, training_days, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {PLAN_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(plan.user_id)
        .bind(plan.dog_id)
        .bind(&plan.title)
        .bind(&plan.description)
        .bind(&plan.behavior_to_correct)
        .bind(plan.difficulty.as_str())
        .bind(to_i32(plan.duration_weeks, "duration_weeks")?)
        .bind(to_i32(plan.sessions_per_week, "sessions_per_week")?)
        .bind(&plan.training_days)
        .bind(plan.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        for step in &plan.steps {
            sqlx::query(
                "INSERT INTO training_steps (id, plan_id, title, description, day_number, duration_minutes) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(record.id)
            .bind(&step.title)
            .bind(&step.description)
            .bind(to_i32(step.day_number, "day_number")?)
            .bind(to_i32(step.duration_minutes, "duration_minutes")?)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;

        Ok(PlanWithDog {
            plan: record.to_domain()?,
            dog_name,
        })
    }

    async fn get_plans_by_user(&self, user_id: Uuid) -> PortResult<Vec<PlanWithDog>> {
        let records = sqlx::query_as::<_, PlanWithDogRecord>(&format!(
            "SELECT {PLAN_COLUMNS}, d.name AS dog_name FROM training_plans p \
             JOIN dogs d ON d.id = p.dog_id WHERE p.user_id = $1 ORDER BY p.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(PlanWithDogRecord::to_domain).collect()
    }

    async fn get_plan_by_id(&self, plan_id: Uuid) -> PortResult<Option<PlanWithDog>> {
        let record = sqlx::query_as::<_, PlanWithDogRecord>(&format!(
            "SELECT {PLAN_COLUMNS}, d.name AS dog_name FROM training_plans p \
             JOIN dogs d ON d.id = p.dog_id WHERE p.id = $1"
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(PlanWithDogRecord::to_domain).transpose()
    }

    async fn update_plan_status(
        &self,
        plan_id: Uuid,
        status: PlanStatus,
    ) -> PortResult<TrainingPlan> {
        // The rank guard keeps concurrent writers from moving a plan backwards.
        let record = sqlx::query_as::<_, PlanRecord>(&format!(
            "UPDATE training_plans AS p SET status = $2 WHERE p.id = $1 AND {} < {} \
             RETURNING {PLAN_COLUMNS}",
            status_rank_sql("p.status"),
            status_rank_sql("$2::text"),
        ))
        .bind(plan_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match record {
            Some(record) => record.to_domain(),
            None => self
                .get_plan_by_id(plan_id)
                .await?
                .map(|found| found.plan)
                .ok_or_else(|| PortError::NotFound(format!("Plan {} not found", plan_id))),
        }
    }

    async fn delete_plan(&self, plan_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM training_plans WHERE id = $1")
            .bind(plan_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Training Steps ---

    async fn get_steps_for_plan(&self, plan_id: Uuid) -> PortResult<Vec<TrainingStep>> {
        let records = sqlx::query_as::<_, StepRecord>(&format!(
            "SELECT {STEP_COLUMNS} FROM training_steps WHERE plan_id = $1 ORDER BY day_number ASC"
        ))
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_step_completed(
        &self,
        step_id: Uuid,
        completed: bool,
    ) -> PortResult<TrainingStep> {
        let record = sqlx::query_as::<_, StepRecord>(&format!(
            "UPDATE training_steps SET completed = $2 WHERE id = $1 RETURNING {STEP_COLUMNS}"
        ))
        .bind(step_id)
        .bind(completed)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Step {} not found", step_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_steps_for_plan(&self, plan_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM training_steps WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Training Sessions ---

    async fn create_session(&self, session: NewTrainingSession) -> PortResult<TrainingSession> {
        let environments: Vec<String> = session.environments.into_iter().collect();
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO training_sessions AS ts (id, step_id, dog_id, completed_at, achievements, \
             challenges, next_steps, duration_minutes, repetitions, environments, environment_notes, \
             dog_mood, rating, treats_used, trainer_mood) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(session.step_id)
        .bind(session.dog_id)
        .bind(session.completed_at)
        .bind(session.achievements)
        .bind(session.challenges)
        .bind(session.next_steps)
        .bind(to_i32(session.duration_minutes, "duration_minutes")?)
        .bind(to_i32(session.repetitions, "repetitions")?)
        .bind(environments)
        .bind(session.environment_notes)
        .bind(session.dog_mood.as_str())
        .bind(i16::from(session.rating))
        .bind(session.treats_used)
        .bind(session.trainer_mood.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_latest_session_for_step(
        &self,
        step_id: Uuid,
    ) -> PortResult<Option<TrainingSession>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM training_sessions ts WHERE ts.step_id = $1 \
             ORDER BY ts.completed_at DESC LIMIT 1"
        ))
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(SessionRecord::to_domain).transpose()
    }

    async fn get_sessions_for_step(&self, step_id: Uuid) -> PortResult<Vec<TrainingSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM training_sessions ts WHERE ts.step_id = $1 \
             ORDER BY ts.completed_at DESC"
        ))
        .bind(step_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        sessions_to_domain(records)
    }

    async fn get_sessions_for_dog(&self, dog_id: Uuid) -> PortResult<Vec<TrainingSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM training_sessions ts WHERE ts.dog_id = $1 \
             ORDER BY ts.completed_at DESC"
        ))
        .bind(dog_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        sessions_to_domain(records)
    }

    async fn get_sessions_for_plan(&self, plan_id: Uuid) -> PortResult<Vec<TrainingSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM training_sessions ts \
             JOIN training_steps s ON s.id = ts.step_id WHERE s.plan_id = $1 \
             ORDER BY ts.completed_at DESC"
        ))
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        sessions_to_domain(records)
    }

    // --- Chat History ---

    async fn create_chat_message(
        &self,
        user_id: Uuid,
        message: &str,
        ai_response: &str,
    ) -> PortResult<ChatMessage> {
        let record = sqlx::query_as::<_, ChatRecord>(
            "INSERT INTO chat_history (id, user_id, message, ai_response) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, message, ai_response, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(message)
        .bind(ai_response)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_chat_history(&self, user_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        let records = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, user_id, message, ai_response, created_at FROM chat_history \
             WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use training_core::{Difficulty, DogMood, TrainerMood};

    fn plan_record(difficulty: &str, status: &str) -> PlanRecord {
        PlanRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            dog_id: Uuid::new_v4(),
            title: "Recall".into(),
            description: "Come when called".into(),
            behavior_to_correct: None,
            difficulty: difficulty.into(),
            duration_weeks: 2,
            sessions_per_week: -1,
            training_days: vec!["Monday".into()],
            status: status.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn plan_rows_parse_their_labels() {
        let plan = plan_record("advanced", "in_progress").to_domain().unwrap();
        assert_eq!(plan.difficulty, Difficulty::Advanced);
        assert_eq!(plan.status, PlanStatus::InProgress);
        assert_eq!(plan.sessions_per_week, 0);

        let corrupt = plan_record("advanced", "paused").to_domain().unwrap_err();
        assert!(corrupt.to_string().contains("paused"));
    }

    #[test]
    fn status_ranks_follow_the_lifecycle() {
        let sql = status_rank_sql("p.status");
        assert_eq!(
            sql,
            "(CASE p.status WHEN 'not_started' THEN 0 WHEN 'in_progress' THEN 1 \
             WHEN 'completed' THEN 2 END)"
        );
        for (rank, status) in STATUS_ORDER.iter().enumerate() {
            for later in &STATUS_ORDER[rank + 1..] {
                assert!(status.can_advance_to(*later));
                assert!(!later.can_advance_to(*status));
            }
        }
    }

    #[test]
    fn oversized_counts_are_refused_before_binding() {
        assert_eq!(to_i32(56, "day_number").unwrap(), 56);
        let err = to_i32(u32::MAX, "day_number").unwrap_err();
        assert!(matches!(err, PortError::Unexpected(ref m) if m.contains("day_number")));
    }

    #[test]
    fn session_rows_collect_environments() {
        let record = SessionRecord {
            id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            dog_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            achievements: "Held a stay".into(),
            challenges: "Squirrels".into(),
            next_steps: String::new(),
            duration_minutes: 20,
            repetitions: 5,
            environments: vec!["Outdoor".into(), "Noisy".into(), "Outdoor".into()],
            environment_notes: String::new(),
            dog_mood: "Distracted".into(),
            rating: 4,
            treats_used: "Cheese".into(),
            trainer_mood: "Patient".into(),
        };
        let session = record.to_domain().unwrap();
        assert_eq!(session.environments.len(), 2);
        assert_eq!(session.dog_mood, DogMood::Distracted);
        assert_eq!(session.trainer_mood, TrainerMood::Patient);
        assert_eq!(session.rating, 4);
    }
}
