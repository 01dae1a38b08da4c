//! services/api/src/adapters/plan_llm.rs
//!
//! Implements the `PlanGenerationService` port by asking the model for a
//! JSON training plan.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use tracing::info;
use training_core::{
    chat::{SYSTEM_PROMPT, TEMPERATURE},
    planning::{parse_generated_plan, plan_prompt},
    ports::{GeneratedPlan, PlanGenerationRequest, PlanGenerationService, PortError, PortResult},
};

use super::chat_llm::map_openai_error;

#[derive(Clone)]
pub struct OpenAiPlanAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiPlanAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl PlanGenerationService for OpenAiPlanAdapter {
    async fn generate_plan(&self, request: &PlanGenerationRequest) -> PortResult<GeneratedPlan> {
        info!(
            "Generating a {}-step plan for {}",
            request.expected_step_count(),
            request.dog_name
        );

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(plan_prompt(request))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let openai_request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .temperature(TEMPERATURE)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::InvalidResponse("No plan content returned by the model.".to_string())
            })?;

        let plan = parse_generated_plan(&content)?;
        info!("Model returned plan '{}' with {} steps", plan.title, plan.steps.len());
        Ok(plan)
    }
}
