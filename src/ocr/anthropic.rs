//! Anthropic Messages API provider (Claude vision).

use super::OcrProvider;
use crate::compress::PreparedImage;
use crate::config::PromptConfig;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::Client,
    url: String,
}

impl AnthropicProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;
        let provider = Self::new(client, api_key);
        Ok(match std::env::var("ANTHROPIC_BASE_URL") {
            Ok(base) => provider.with_url(format!("{}/v1/messages", base.trim_end_matches('/'))),
            Err(_) => provider,
        })
    }

    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client,
            url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Point the provider at another Messages endpoint, such as a gateway.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

// ── Messages API request/response types ─────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Image { source: ImageSource },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

fn build_request<'a>(image: &PreparedImage, config: &'a PromptConfig) -> MessagesRequest<'a> {
    MessagesRequest {
        model: &config.model,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        messages: vec![Message {
            role: "user",
            content: vec![
                ContentBlock::Image {
                    source: ImageSource {
                        source_type: "base64",
                        media_type: image.media_type.as_str(),
                        data: BASE64.encode(&image.data),
                    },
                },
                ContentBlock::Text {
                    text: &config.prompt,
                },
            ],
        }],
    }
}

/// Join every text block of a response.
fn response_text(response: MessagesResponse) -> String {
    response
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn transcribe(&self, image: &PreparedImage, config: &PromptConfig) -> Result<String> {
        let body = build_request(image, config);

        info!(
            "AnthropicProvider: sending {} ({} bytes) to model={}",
            image.media_type.as_str(),
            image.data.len(),
            config.model
        );

        let resp = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Anthropic")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "AnthropicProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );
        let response: MessagesResponse =
            serde_json::from_str(&raw_text).context("Failed to parse Anthropic response")?;

        if let Some(usage) = &response.usage {
            info!(
                "Anthropic response: input_tokens={}, output_tokens={}, stop_reason={:?}",
                usage.input_tokens, usage.output_tokens, response.stop_reason
            );
        }

        Ok(response_text(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::MediaType;
    use crate::config::create_default_config;
    use crate::pipeline::{process_image, SourceImage};
    use crate::schema::TranscriptionStatus;
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    fn sample_image() -> PreparedImage {
        PreparedImage {
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            media_type: MediaType::Jpeg,
            width: Some(1),
            height: Some(1),
            transcoded: false,
        }
    }

    #[test]
    fn test_request_shape() {
        let config = create_default_config();
        let image = sample_image();
        let value = serde_json::to_value(build_request(&image, &config)).unwrap();

        assert_eq!(value["model"], "claude-3-sonnet-20240229");
        assert_eq!(value["max_tokens"], 4096);
        assert_eq!(value["temperature"], 0.0);

        let content = &value["messages"][0]["content"];
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[0]["source"]["data"], "/9j/2Q==");
        assert_eq!(content[1]["type"], "text");
        assert!(content[1]["text"].as_str().unwrap().starts_with("You are an expert OCR system"));
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{
                "id": "msg_1",
                "content": [
                    {"type": "text", "text": "Line one\nLine two"},
                    {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                    {"type": "text", "text": "Tail"}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 1500, "output_tokens": 12}
            }"#,
        )
        .unwrap();

        assert_eq!(response_text(response), "Line one\nLine two\nTail");
    }

    #[test]
    fn test_empty_response_is_empty_text() {
        let response: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert_eq!(response_text(response), "");
    }

    // ── HTTP round trips against a local listener ──────────────────────────


    type Seen = Arc<Mutex<Vec<(HeaderMap, serde_json::Value)>>>;

    async fn ok_messages(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        seen.lock().unwrap().push((headers, body));
        Json(serde_json::json!({
            "content": [
                {"type": "text", "text": "INVOICE 42"},
                {"type": "text", "text": "Total: $10"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 900, "output_tokens": 8}
        }))
    }

    async fn overloaded() -> (StatusCode, &'static str) {
        (
            StatusCode::from_u16(529).unwrap(),
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
    }

    async fn serve(seen: Seen) -> String {
        let app = Router::new()
            .route("/v1/messages", post(ok_messages))
            .route("/overloaded/v1/messages", post(overloaded))
            .with_state(seen);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_transcribe_sends_headers_and_joins_text() {
        let seen = Seen::default();
        let base = serve(seen.clone()).await;
        let provider = AnthropicProvider::new(reqwest::Client::new(), "test-key")
            .with_url(format!("{}/v1/messages", base));

        let text = provider
            .transcribe(&sample_image(), &create_default_config())
            .await
            .unwrap();

        assert_eq!(text, "INVOICE 42\nTotal: $10");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (headers, body) = &seen[0];
        assert_eq!(headers["x-api-key"], "test-key");
        assert_eq!(headers["anthropic-version"], "2023-06-01");
        assert_eq!(body["messages"][0]["content"][0]["source"]["data"], "/9j/2Q==");
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let base = serve(Seen::default()).await;
        let provider = AnthropicProvider::new(reqwest::Client::new(), "test-key")
            .with_url(format!("{}/overloaded/v1/messages", base));

        let err = provider
            .transcribe(&sample_image(), &create_default_config())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("Anthropic API error (529"), "{}", err);
        assert!(err.contains("overloaded_error"), "{}", err);

        // The pipeline folds the same failure into the transcription text.
        let jpeg = {
            let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
            let mut buf = std::io::Cursor::new(Vec::new());
            image::DynamicImage::ImageRgb8(img)
                .write_to(&mut buf, image::ImageFormat::Jpeg)
                .unwrap();
            buf.into_inner()
        };
        let result = process_image(
            &provider,
            &create_default_config(),
            &crate::compress::CompressionSettings::default(),
            1,
            &SourceImage {
                filename: "page.jpg".to_string(),
                data: jpeg,
            },
        )
        .await;

        assert_eq!(result.status, TranscriptionStatus::Failed);
        assert!(result.text.starts_with("Error processing image: Anthropic API error (529"));
        assert!(result.text.contains("Overloaded"));
    }
}
