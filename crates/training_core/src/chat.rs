//! crates/training_core/src/chat.rs
//!
//! The trainer chat: query classification, bounded history selection, model tier
//! and budget choice, templated fast-path replies, and the fallback text that
//! replaces any model failure.

use chrono::NaiveDate;
use futures::future::try_join_all;
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{ChatMessage, Dog, PlanStatus, PlanWithDog};
use crate::ports::{
    ChatCompletionService, CompletionRequest, DatabaseService, ModelTier, PortError, PortResult,
    PromptMessage,
};
use crate::progress::{performance_status, plan_stats, training_level};

pub const TEMPERATURE: f32 = 0.7;

pub const NO_DOGS_REPLY: &str =
    "Please add your dog's information first to get personalized advice.";
pub const CONTEXT_LENGTH_REPLY: &str =
    "I'm having trouble processing your request. Could you try asking in a simpler way?";
pub const GENERIC_FAILURE_REPLY: &str =
    "I encountered an issue. Please try again with your question.";

pub const SYSTEM_PROMPT: &str = "You are an expert dog trainer with years of experience in positive reinforcement training methods and behavior modification.
You have access to the user's complete training history, including:
- Their dog's profile (breed, age, weight)
- Current training plans and progress
- Recent training sessions and ratings
- Past interactions and advice
- Specific behaviors that need correction

When responding:
1. Reference specific details from their training history
2. Consider the dog's breed characteristics and age-appropriate exercises
3. If a specific behavior needs correction, prioritize exercises that address this issue while maintaining positive reinforcement
4. Acknowledge their progress and build upon completed steps
5. If they're struggling (low ratings), suggest modifications
6. Keep advice practical and focused on positive reinforcement
7. If they're doing well, suggest progression to more advanced exercises

For behavior correction:
- Start with understanding the root cause of the behavior
- Break down correction into small, manageable steps
- Focus on reinforcing alternative positive behaviors
- Include environmental management strategies
- Suggest preventive exercises

Remember to:
- Keep responses concise but informative
- Avoid technical jargon unless necessary
- Recommend veterinary consultation for health issues
- Celebrate their successes and progress";

//=========================================================================================
// Classification
//=========================================================================================

static BASIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)how\s+old|age",
        r"(?i)what(?:'s|\s+is)\s+(?:the\s+)?(?:dog'?s?\s+)?(?:breed|name)",
        r"(?i)basic\s+command|sit|stay|come",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TRAINING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)train(?:ing)?",
        r"(?i)exercise|practice",
        r"(?i)behavior|behaviour",
        r"(?i)progress|improvement",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static AGE_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)how\s+old|what(?:'s|\s+is)\s+(?:the\s+)?(?:dog'?s?\s+)?age").unwrap()
});
static BREED_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)what(?:'s|\s+is)\s+(?:the\s+)?(?:dog'?s?\s+)?breed").unwrap()
});
static NAME_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)what(?:'s|\s+is)\s+(?:the\s+)?(?:dog'?s?\s+)?name").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Basic,
    Training,
    Complex,
}

/// Basic patterns win over training patterns; anything else is complex.
pub fn classify(message: &str) -> QueryKind {
    if BASIC_PATTERNS.iter().any(|p| p.is_match(message)) {
        QueryKind::Basic
    } else if TRAINING_PATTERNS.iter().any(|p| p.is_match(message)) {
        QueryKind::Training
    } else {
        QueryKind::Complex
    }
}

/// Prior turns worth sending along with a query, as alternating user/assistant messages.
pub fn select_context(history: &[ChatMessage], kind: QueryKind) -> Vec<PromptMessage> {
    let turns: Vec<&ChatMessage> = match kind {
        QueryKind::Basic => last_n(history.iter(), 1),
        QueryKind::Training => last_n(
            history
                .iter()
                .filter(|m| classify(&m.message) == QueryKind::Training),
            3,
        ),
        QueryKind::Complex => last_n(history.iter(), 5),
    };

    turns
        .into_iter()
        .flat_map(|m| {
            [
                PromptMessage::user(m.message.clone()),
                PromptMessage::assistant(m.ai_response.clone()),
            ]
        })
        .collect()
}

fn last_n<'a>(turns: impl Iterator<Item = &'a ChatMessage>, n: usize) -> Vec<&'a ChatMessage> {
    let all: Vec<&ChatMessage> = turns.collect();
    let skip = all.len().saturating_sub(n);
    all.into_iter().skip(skip).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseBudget {
    pub tier: ModelTier,
    pub max_tokens: u32,
}

pub fn budget_for(kind: QueryKind) -> ResponseBudget {
    match kind {
        QueryKind::Basic => ResponseBudget {
            tier: ModelTier::Fast,
            max_tokens: 150,
        },
        QueryKind::Training => ResponseBudget {
            tier: ModelTier::Capable,
            max_tokens: 300,
        },
        QueryKind::Complex => ResponseBudget {
            tier: ModelTier::Capable,
            max_tokens: 500,
        },
    }
}

/// Templated answers about the dog's profile that never reach the model.
pub fn fast_path_reply(message: &str, dog: &Dog, today: NaiveDate) -> Option<String> {
    if AGE_QUERY.is_match(message) {
        return Some(match dog.age_years(today) {
            Some(age) => format!("{} is {} years old.", dog.name, age),
            None => format!("{}'s age is not specified.", dog.name),
        });
    }
    if BREED_QUERY.is_match(message) {
        return Some(match dog.breed.as_deref().filter(|b| !b.trim().is_empty()) {
            Some(breed) => format!("{} is a {}.", dog.name, breed),
            None => format!("{}'s breed is not specified.", dog.name),
        });
    }
    if NAME_QUERY.is_match(message) {
        return Some(format!("Your dog's name is {}.", dog.name));
    }
    None
}

pub fn fallback_reply(err: &PortError) -> &'static str {
    if err.is_context_length_exceeded() {
        CONTEXT_LENGTH_REPLY
    } else {
        GENERIC_FAILURE_REPLY
    }
}

//=========================================================================================
// Chat Assistant
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Answers chat messages for one user against their stored dogs and plans.
pub struct ChatAssistant<'a> {
    db: &'a dyn DatabaseService,
    model: &'a dyn ChatCompletionService,
}

impl<'a> ChatAssistant<'a> {
    pub fn new(db: &'a dyn DatabaseService, model: &'a dyn ChatCompletionService) -> Self {
        Self { db, model }
    }

    /// Produces the assistant's reply. Never fails: any error becomes fallback text.
    pub async fn respond(
        &self,
        user_id: Uuid,
        message: &str,
        history: &[ChatMessage],
        today: NaiveDate,
    ) -> String {
        match self.try_respond(user_id, message, history, today).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Chat completion failed for user {}: {}", user_id, e);
                fallback_reply(&e).to_string()
            }
        }
    }

    async fn try_respond(
        &self,
        user_id: Uuid,
        message: &str,
        history: &[ChatMessage],
        today: NaiveDate,
    ) -> PortResult<String> {
        let dogs = self.db.get_dogs_by_owner(user_id).await?;
        let Some(dog) = dogs.first() else {
            return Ok(NO_DOGS_REPLY.to_string());
        };

        if let Some(reply) = fast_path_reply(message, dog, today) {
            debug!("Answered chat message from dog profile without a model call.");
            return Ok(reply);
        }

        let kind = classify(message);
        let budget = budget_for(kind);
        let system_prompt = match kind {
            QueryKind::Basic => SYSTEM_PROMPT.to_string(),
            QueryKind::Training => {
                let plans = self.db.get_plans_by_user(user_id).await?;
                format!(
                    "{SYSTEM_PROMPT}\n\n{}",
                    dog_summary(dog, &plans, today)
                )
            }
            QueryKind::Complex => {
                let analysis = self.training_analysis(user_id, &dogs, today).await?;
                format!("{SYSTEM_PROMPT}\n\nUser's Current Training Status:\n{analysis}")
            }
        };

        let mut messages = select_context(history, kind);
        messages.push(PromptMessage::user(message));

        info!(
            "Sending {:?} chat query to {:?} model with {} prior message(s).",
            kind,
            budget.tier,
            messages.len() - 1
        );

        self.model
            .complete(CompletionRequest {
                system_prompt,
                messages,
                tier: budget.tier,
                max_tokens: budget.max_tokens,
                temperature: TEMPERATURE,
            })
            .await
    }

    /// Pretty-printed JSON describing the user's dogs and up to two active plans.
    async fn training_analysis(
        &self,
        user_id: Uuid,
        dogs: &[Dog],
        today: NaiveDate,
    ) -> PortResult<String> {
        let mut plans = self.db.get_plans_by_user(user_id).await?;
        plans.sort_by_key(|p| p.plan.created_at);
        let level = training_level(plans.iter().map(|p| &p.plan));

        let active: Vec<&PlanWithDog> = plans
            .iter()
            .filter(|p| p.plan.status == PlanStatus::InProgress)
            .collect();
        let recent = &active[active.len().saturating_sub(2)..];

        let performance = try_join_all(recent.iter().map(|p| async move {
            let steps = self.db.get_steps_for_plan(p.plan.id).await?;
            let sessions = self.db.get_sessions_for_plan(p.plan.id).await?;
            let stats = plan_stats(&steps, &sessions);
            let consistency = if stats.total_sessions > 0 {
                "regular"
            } else {
                "needs_improvement"
            };
            Ok::<_, PortError>(json!({
                "title": p.plan.title,
                "progress": stats.progress_percentage,
                "performance": {
                    "progress": stats.progress_percentage,
                    "rating": stats.average_rating,
                    "consistency": consistency,
                    "status": performance_status(stats.average_rating).as_str(),
                },
            }))
        }))
        .await?;

        let dog_profiles: Vec<serde_json::Value> = dogs
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "breed": d.breed,
                    "age_years": d.age_years(today),
                    "training_level": level.as_str(),
                })
            })
            .collect();
        let analysis = json!({
            "dogs": dog_profiles,
            "active_plans": performance,
        });

        serde_json::to_string_pretty(&analysis).map_err(|e| PortError::Unexpected(e.to_string()))
    }

    /// Replies to `text`, then stores the turn. Model failures are stored as fallback text.
    pub async fn send_message(
        &self,
        user_id: Uuid,
        text: &str,
        today: NaiveDate,
    ) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let history = self.db.get_chat_history(user_id).await.unwrap_or_else(|e| {
            warn!("Could not load chat history for user {}: {}", user_id, e);
            Vec::new()
        });

        let reply = self.respond(user_id, text, &history, today).await;
        let stored = self.db.create_chat_message(user_id, text, &reply).await?;
        Ok(stored)
    }
}

fn dog_summary(dog: &Dog, plans: &[PlanWithDog], today: NaiveDate) -> String {
    let breed = dog
        .breed
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or("Unknown breed");
    let age = match dog.age_years(today) {
        Some(years) => format!("{years} years"),
        None => "age unknown".to_string(),
    };
    let level = training_level(plans.iter().map(|p| &p.plan));
    format!("Dog: {} ({}, {})\nTraining Level: {}", dog.name, breed, age, level)
}

//=========================================================================================
// Training Tips
//=========================================================================================

pub fn tip_prompt(dog: &Dog, today: NaiveDate) -> String {
    let breed = dog.breed.as_deref().filter(|b| !b.trim().is_empty());
    let age = dog.age_years(today).filter(|a| *a > 0);

    let mut prompt = format!("Provide a short, practical training tip for {}", dog.name);
    if let Some(breed) = breed {
        prompt.push_str(&format!(" ({breed})"));
    }
    if let Some(age) = age {
        prompt.push_str(&format!(", age {age} years"));
    }
    prompt.push_str(".\nFocus on positive reinforcement");
    if age.is_some() {
        prompt.push_str(" and make it specific to the dog's age");
    }
    if breed.is_some() {
        prompt.push_str(" and breed characteristics");
    }
    prompt.push('.');
    prompt
}

/// A short positive-reinforcement tip for one dog. Errors are returned to the caller.
pub async fn suggest_training_tip(
    model: &dyn ChatCompletionService,
    dog: &Dog,
    today: NaiveDate,
) -> PortResult<String> {
    info!("Generating training tip for dog {}", dog.id);
    model
        .complete(CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![PromptMessage::user(tip_prompt(dog, today))],
            tier: ModelTier::Fast,
            max_tokens: 150,
            temperature: TEMPERATURE,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Difficulty;
    use crate::ports::PromptRole;
    use crate::testing::{chat_turn, dog, plan, session_for, step_in, InMemoryStore, ScriptedModel};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn store_with_rex(user_id: Uuid) -> InMemoryStore {
        let store = InMemoryStore::default();
        let mut rex = dog(user_id, "Rex", NaiveDate::from_ymd_opt(2021, 3, 1));
        rex.breed = Some("Border Collie".into());
        store.state().dogs.push(rex);
        store
    }

    #[test]
    fn basic_patterns_take_precedence() {
        assert_eq!(classify("How old is my dog?"), QueryKind::Basic);
        assert_eq!(classify("Can we train sit today?"), QueryKind::Basic);
        assert_eq!(classify("Training tips for recall"), QueryKind::Training);
        assert_eq!(classify("She barks at the mailman"), QueryKind::Complex);
        assert_eq!(classify("BEHAVIOUR problems"), classify("BEHAVIOUR problems"));
    }

    #[test]
    fn context_is_bounded_per_kind() {
        let user = Uuid::new_v4();
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| chat_turn(user, &format!("training question {i}"), "answer", i))
            .chain((10..20).map(|i| chat_turn(user, "why does he bark", "answer", i)))
            .collect();

        assert_eq!(select_context(&history, QueryKind::Basic).len(), 2);
        assert_eq!(select_context(&history, QueryKind::Complex).len(), 10);

        let training = select_context(&history, QueryKind::Training);
        assert_eq!(training.len(), 6);
        assert_eq!(training[0].role, PromptRole::User);
        assert_eq!(training[0].content, "training question 7");
        assert_eq!(training[1].role, PromptRole::Assistant);
        assert_eq!(training[4].content, "training question 9");

        assert!(select_context(&[], QueryKind::Complex).is_empty());
    }

    #[test]
    fn budgets_follow_classification() {
        assert_eq!(budget_for(QueryKind::Basic).tier, ModelTier::Fast);
        assert_eq!(budget_for(QueryKind::Training).max_tokens, 300);
        assert_eq!(budget_for(QueryKind::Complex).tier, ModelTier::Capable);
        assert_eq!(budget_for(QueryKind::Complex).max_tokens, 500);
    }

    #[test]
    fn fast_path_templates() {
        let mut rex = dog(Uuid::new_v4(), "Rex", None);
        assert_eq!(
            fast_path_reply("how old is he", &rex, today()).as_deref(),
            Some("Rex's age is not specified.")
        );
        assert_eq!(
            fast_path_reply("What's the breed?", &rex, today()).as_deref(),
            Some("Rex's breed is not specified.")
        );
        rex.breed = Some("Beagle".into());
        assert_eq!(
            fast_path_reply("what is the dog's breed", &rex, today()).as_deref(),
            Some("Rex is a Beagle.")
        );
        assert_eq!(
            fast_path_reply("What's the name", &rex, today()).as_deref(),
            Some("Your dog's name is Rex.")
        );
        assert_eq!(fast_path_reply("teach sit", &rex, today()), None);
    }

    #[tokio::test]
    async fn scenario_c_age_question_skips_the_model() {
        let user = Uuid::new_v4();
        let store = store_with_rex(user);
        let model = ScriptedModel::replying("should not be used");

        let reply = ChatAssistant::new(&store, &model)
            .respond(user, "How old is my dog?", &[], today())
            .await;

        assert_eq!(reply, "Rex is 3 years old.");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn scenario_e_context_length_failure_is_logged_as_specific_fallback() {
        let user = Uuid::new_v4();
        let store = store_with_rex(user);
        let model = ScriptedModel::failing("This model's maximum context length is 8192 tokens");

        let stored = ChatAssistant::new(&store, &model)
            .send_message(user, "Why does she chew the couch?", today())
            .await
            .unwrap();

        assert_eq!(stored.ai_response, CONTEXT_LENGTH_REPLY);
        assert_eq!(store.state().chat.len(), 1);
        assert_eq!(
            fallback_reply(&PortError::Unexpected("timeout".into())),
            GENERIC_FAILURE_REPLY
        );
    }

    #[tokio::test]
    async fn no_dogs_means_no_model_call() {
        let user = Uuid::new_v4();
        let store = InMemoryStore::default();
        let model = ScriptedModel::replying("unused");

        let reply = ChatAssistant::new(&store, &model)
            .respond(user, "Why does she chew the couch?", &[], today())
            .await;

        assert_eq!(reply, NO_DOGS_REPLY);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn store_failure_becomes_generic_fallback() {
        let user = Uuid::new_v4();
        let store = InMemoryStore::with(|s| s.fail_dogs = true);
        let model = ScriptedModel::replying("unused");

        let reply = ChatAssistant::new(&store, &model)
            .respond(user, "Why does she chew the couch?", &[], today())
            .await;

        assert_eq!(reply, GENERIC_FAILURE_REPLY);
    }

    #[tokio::test]
    async fn training_query_uses_capable_tier_and_dog_summary() {
        let user = Uuid::new_v4();
        let store = store_with_rex(user);
        let mut finished = plan(PlanStatus::Completed);
        finished.user_id = user;
        finished.difficulty = Difficulty::Intermediate;
        store.insert_plan(finished, "Rex", vec![]);
        let model = ScriptedModel::replying("Keep sessions short.");
        let history = vec![
            chat_turn(user, "training for recall?", "Use a long line.", 0),
            chat_turn(user, "she barks at night", "Try crate covers.", 1),
        ];

        let reply = ChatAssistant::new(&store, &model)
            .respond(user, "Any training ideas for leash pulling?", &history, today())
            .await;

        assert_eq!(reply, "Keep sessions short.");
        let request = model.last_request().unwrap();
        assert_eq!(request.tier, ModelTier::Capable);
        assert_eq!(request.max_tokens, 300);
        assert_eq!(request.temperature, TEMPERATURE);
        assert!(request
            .system_prompt
            .ends_with("Dog: Rex (Border Collie, 3 years)\nTraining Level: intermediate"));
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].content, "training for recall?");
    }

    #[tokio::test]
    async fn complex_query_carries_plan_analysis() {
        let user = Uuid::new_v4();
        let store = store_with_rex(user);
        let mut active = plan(PlanStatus::InProgress);
        active.user_id = user;
        active.title = "Calm greetings".into();
        let steps = vec![step_in(active.id, 1, true), step_in(active.id, 2, false)];
        store.state().sessions.push(session_for(&steps[0], 4));
        store.insert_plan(active, "Rex", steps);
        let model = ScriptedModel::replying("Here is a plan.");

        ChatAssistant::new(&store, &model)
            .respond(user, "She jumps on guests at the door", &[], today())
            .await;

        let request = model.last_request().unwrap();
        assert_eq!(request.max_tokens, 500);
        let (_, analysis) = request
            .system_prompt
            .split_once("User's Current Training Status:\n")
            .unwrap();
        let analysis: serde_json::Value = serde_json::from_str(analysis).unwrap();
        assert_eq!(analysis["dogs"][0]["age_years"], 3);
        assert_eq!(analysis["active_plans"][0]["title"], "Calm greetings");
        assert_eq!(analysis["active_plans"][0]["performance"]["status"], "excellent");
        assert_eq!(analysis["active_plans"][0]["performance"]["consistency"], "regular");
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_io() {
        let user = Uuid::new_v4();
        let store = store_with_rex(user);
        let model = ScriptedModel::replying("unused");

        let result = ChatAssistant::new(&store, &model)
            .send_message(user, "   ", today())
            .await;

        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert!(store.state().chat.is_empty());
    }

    #[tokio::test]
    async fn tip_uses_fast_tier_and_mentions_breed() {
        let user = Uuid::new_v4();
        let mut rex = dog(user, "Rex", NaiveDate::from_ymd_opt(2021, 3, 1));
        rex.breed = Some("Beagle".into());
        let model = ScriptedModel::replying("Reward calm behavior.");

        let tip = suggest_training_tip(&model, &rex, today()).await.unwrap();

        assert_eq!(tip, "Reward calm behavior.");
        let request = model.last_request().unwrap();
        assert_eq!(request.tier, ModelTier::Fast);
        assert_eq!(request.max_tokens, 150);
        assert!(request.messages[0].content.contains("Rex (Beagle), age 3 years"));
        assert!(request.messages[0].content.ends_with("and breed characteristics."));
    }
}
