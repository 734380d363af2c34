//! Generation stage: derive text content for an entity from its source text,
//! fetched content and the run's shared context.

use super::StageOutcome;
use crate::error::ApiError;
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient};
use crate::retry::RetryExecutor;
use crate::types::EntityKey;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a generator may use for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub key: EntityKey,
    pub source_text: Option<String>,
    pub fetched_content: Option<Value>,
    pub shared_context: Option<String>,
}

/// External collaborator producing derived text. Holds no state between calls.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ApiError>;
}

pub struct GenerationStage {
    generator: Arc<dyn ContentGenerator>,
    retry: RetryExecutor,
}

impl GenerationStage {
    pub fn new(generator: Arc<dyn ContentGenerator>, retry: RetryExecutor) -> Self {
        Self { generator, retry }
    }

    pub async fn run(&self, request: &GenerationRequest) -> StageOutcome<String> {
        let subject = request.key.to_string();
        debug!(key = %request.key, has_fetched = request.fetched_content.is_some(), "Generating");
        let result = self
            .retry
            .run(
                &subject,
                |_| self.generator.generate(request),
                |content: &String| !content.trim().is_empty(),
            )
            .await;
        StageOutcome::from_retry(result, |_| "generator returned empty content".to_string())
    }
}

/// Prompts a model for a marketing pitch aimed at the entity.
pub struct ModelPitchGenerator {
    client: Arc<dyn ModelProviderClient>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ModelPitchGenerator {
    pub fn new(client: Arc<dyn ModelProviderClient>, temperature: f32, max_tokens: Option<u32>) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
        }
    }

    fn build_messages(&self, request: &GenerationRequest) -> Vec<ChatMessage> {
        let mut background = Vec::new();
        if let Some(text) = &request.source_text {
            background.push(format!("How we serve this audience:\n{}", text));
        }
        if let Some(context) = request.shared_context.as_deref().filter(|c| !c.trim().is_empty()) {
            background.push(format!("About our company:\n{}", context));
        }
        if let Some(fetched) = &request.fetched_content {
            background.push(format!("About the audience, from their website:\n{}", fetched));
        }

        let system = "You are a B2B marketing strategist. Write persuasive, professional copy.";
        let user = format!(
            "Target audience ({category}): {name}\n\n{background}\n\n\
             Write a marketing pitch of roughly 450 to 550 words addressed to this audience. \
             Focus on their pain points and needs and on why our offering answers them. \
             Output only the pitch as plain prose, with no headings or bullet points.",
            category = request.key.category(),
            name = request.key.name(),
            background = background.join("\n\n"),
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

#[async_trait]
impl ContentGenerator for ModelPitchGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ApiError> {
        let response = self
            .client
            .complete(
                self.build_messages(request),
                CompletionOptions {
                    temperature: Some(self.temperature),
                    max_tokens: self.max_tokens,
                },
            )
            .await?;
        info!(
            key = %request.key,
            provider = self.client.provider_name(),
            model = %response.model,
            chars = response.content.len(),
            "Content generated"
        );
        Ok(response.content.trim().to_string())
    }
}
