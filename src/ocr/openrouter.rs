//! OpenRouter chat-completions provider for vision models.

use super::OcrProvider;
use crate::compress::PreparedImage;
use crate::config::PromptConfig;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "anthropic/claude-3-sonnet";

/// OpenRouter client for vision chat completions.
#[derive(Clone)]
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    url: String,
    /// Overrides the profile model, which is named for the Anthropic API.
    model: String,
}

impl OpenRouterProvider {
    /// Create a new provider, reading the API key from OPENROUTER_API_KEY.
    pub fn from_env(client: Client) -> Result<Self> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable not set")?;
        let model = env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(client, api_key, model))
    }

    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            url: OPENROUTER_API_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn send_request(&self, request: ChatCompletionRequest) -> Result<String> {
        debug!("Sending request to OpenRouter: model={}", request.model);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter API error ({}): {}", status, error_text);
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;

        if let Some(usage) = &response.usage {
            info!(
                "OpenRouter response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(first_choice_text(response))
    }
}

#[async_trait::async_trait]
impl OcrProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn transcribe(&self, image: &PreparedImage, config: &PromptConfig) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![user_with_image(&config.prompt, image)],
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
        };

        self.send_request(request).await
    }
}

fn first_choice_text(response: ChatCompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default()
}

/// User message carrying one image as a data URL, followed by the prompt.
fn user_with_image(text: &str, image: &PreparedImage) -> Message {
    let data_url = format!(
        "data:{};base64,{}",
        image.media_type.as_str(),
        BASE64.encode(&image.data)
    );

    Message {
        role: Role::User,
        content: vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: data_url },
            },
            ContentPart::Text {
                text: text.to_string(),
            },
        ],
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: Role,
    content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}
