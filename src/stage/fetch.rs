//! Fetch stage: turn an entity's reference URL into structured content.

use super::StageOutcome;
use crate::error::ApiError;
use crate::provider::{build_http_client, ChatMessage, CompletionOptions, ModelProviderClient};
use crate::retry::RetryExecutor;
use crate::types::{is_empty_value, EntityKey};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Answer a model gives when the page told it nothing. Retried like a timeout.
pub const UNABLE_TO_DETERMINE: &str = "Unable to determine from the provided information";

/// External collaborator that reads a URL and returns structured content.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, ApiError>;
}

/// Fetched content that carries nothing worth keeping.
pub fn is_unusable_fetch(content: &Value) -> bool {
    match content {
        Value::String(s) => s.trim() == UNABLE_TO_DETERMINE || s.trim().is_empty(),
        other => is_empty_value(other),
    }
}

pub struct FetchStage {
    fetcher: Arc<dyn ContentFetcher>,
    retry: RetryExecutor,
}

impl FetchStage {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, retry: RetryExecutor) -> Self {
        Self { fetcher, retry }
    }

    pub async fn run(&self, key: &EntityKey, url: &str) -> StageOutcome<Value> {
        let subject = key.to_string();
        debug!(key = %key, url, "Fetching");
        let result = self
            .retry
            .run(
                &subject,
                |_| self.fetcher.fetch(url),
                |content: &Value| !is_unusable_fetch(content),
            )
            .await;
        StageOutcome::from_retry(result, |content| {
            format!("fetcher returned no usable content ({})", content)
        })
    }
}

/// Reads a page and asks a model to summarize it as JSON.
pub struct ModelUrlAnalyzer {
    client: Arc<dyn ModelProviderClient>,
    http: Client,
    temperature: f32,
    max_tokens: Option<u32>,
    excerpt_chars: usize,
}

impl ModelUrlAnalyzer {
    const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
    const DEFAULT_EXCERPT_CHARS: usize = 3000;

    pub fn new(
        client: Arc<dyn ModelProviderClient>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client,
            http: build_http_client(Self::PAGE_TIMEOUT)?,
            temperature,
            max_tokens,
            excerpt_chars: Self::DEFAULT_EXCERPT_CHARS,
        })
    }

    /// Page body truncated to the excerpt budget. A page that cannot be read is
    /// not an error here; the model still gets the URL.
    async fn page_excerpt(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(url, status = %response.status(), "Page download refused");
                return None;
            }
            Err(e) => {
                debug!(url, error = %e, "Page download failed");
                return None;
            }
        };
        let body = response.text().await.ok()?;
        Some(body.chars().take(self.excerpt_chars).collect())
    }

    fn build_messages(&self, url: &str, excerpt: Option<&str>) -> Vec<ChatMessage> {
        let system = "You analyze web pages for a B2B marketing team. \
            Reply with a single JSON object and nothing else.";
        let page = excerpt.unwrap_or("(page content unavailable)");
        let user = format!(
            "URL: {url}\n\
             Page content (truncated to {limit} characters):\n{page}\n\n\
             Return a JSON object with these keys: \
             \"main_purpose\", \"key_products_or_services\", \"target_audience\", \
             \"notable_quotes\", \"competitive_differentiators\", \"summary\".\n\
             If the page gives you nothing to go on, reply with the JSON string \
             \"{UNABLE_TO_DETERMINE}\".",
            url = url,
            limit = self.excerpt_chars,
            page = page,
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

#[async_trait]
impl ContentFetcher for ModelUrlAnalyzer {
    async fn fetch(&self, url: &str) -> Result<Value, ApiError> {
        let excerpt = self.page_excerpt(url).await;
        let messages = self.build_messages(url, excerpt.as_deref());
        let response = self
            .client
            .complete(
                messages,
                CompletionOptions {
                    temperature: Some(self.temperature),
                    max_tokens: self.max_tokens,
                },
            )
            .await?;
        info!(
            url,
            provider = self.client.provider_name(),
            model = %response.model,
            "URL analyzed"
        );
        parse_model_json(&response.content)
    }
}

/// Parse a model reply as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_model_json(raw: &str) -> Result<Value, ApiError> {
    let trimmed = raw.trim();
    if trimmed == UNABLE_TO_DETERMINE {
        return Ok(Value::String(UNABLE_TO_DETERMINE.to_string()));
    }
    let body = strip_code_fence(trimmed);
    serde_json::from_str(body).map_err(|e| {
        ApiError::MalformedResponse(format!("model reply is not JSON ({}): {}", e, preview(trimmed)))
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 80;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    }
}
