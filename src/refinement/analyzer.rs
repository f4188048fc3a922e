//! The AI analysis collaborator.
//!
//! The engine only ever needs one operation from a vision model: hand it some
//! images and an instruction, get text back. [`Analyzer`] is that seam; the
//! orchestrator treats the returned text as opaque and parses it itself.
//!
//! [`HttpAnalyzer`] talks to an OpenAI-compatible chat-completions endpoint.
//! Failures are classified into [`TransientKind`]s from the HTTP status first, then
//! from the structured error body, and only then from a fixed set of message
//! indicators, so the retry policy never has to look at message text.

use crate::error::{Error, Result, TransientKind};
use crate::refinement::transport::ImagePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// How the collaborator is asked to shape its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseFormat {
    /// Request a JSON object response (`response_format: json_object`).
    #[default]
    Structured,
    /// Plain completion; the instruction alone asks for JSON.
    FreeText,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Submits `images` with `instruction` and returns the raw response text.
    async fn analyze(
        &self,
        images: &[ImagePayload],
        instruction: &str,
        format: ResponseFormat,
    ) -> Result<String>;
}

/// Connection settings for [`HttpAnalyzer`]. Built once and passed in; there is no
/// process-wide client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzerConfig {
    /// Full URL of the chat-completions endpoint.
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
}

#[derive(Debug, Serialize)]
struct ResponseFormatBody {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Content {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for the analysis collaborator.
#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    client: reqwest::Client,
    config: AnalyzerConfig,
}

impl HttpAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() || config.model.trim().is_empty() {
            return Err(Error::Input("analyzer endpoint and model must be set".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    fn build_request<'a>(&'a self, images: &[ImagePayload], instruction: &str, format: ResponseFormat) -> ChatRequest<'a> {
        let mut content = vec![Content::Text {
            text: instruction.to_string(),
        }];
        content.extend(images.iter().map(|image| Content::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
                detail: "high",
            },
        }));

        ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content,
            }],
            temperature: self.config.temperature,
            response_format: match format {
                ResponseFormat::Structured => Some(ResponseFormatBody { r#type: "json_object" }),
                ResponseFormat::FreeText => None,
            },
        }
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        images: &[ImagePayload],
        instruction: &str,
        format: ResponseFormat,
    ) -> Result<String> {
        let request = self.build_request(images, instruction, format);
        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "collaborator responded");

        if !status.is_success() {
            return Err(match classify_failure(status.as_u16(), &body) {
                Some(kind) => Error::transient(kind, format!("HTTP {status}: {}", truncate(&body, 300))),
                None => Error::response(format!("collaborator rejected the request with HTTP {status}"), body),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::response(format!("malformed chat response: {e}"), body.clone()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::response("chat response carried no content", body))
    }
}

/// Typed error body, as sent by OpenAI- and Google-style endpoints.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

const RATE_LIMIT_CODES: &[&str] = &[
    "resource_exhausted",
    "rate_limit_exceeded",
    "rate_limit_error",
    "insufficient_quota",
    "429",
];
const SERVER_FAULT_CODES: &[&str] = &[
    "unavailable",
    "internal",
    "server_error",
    "overloaded_error",
    "api_error",
    "500",
    "502",
    "503",
    "504",
];
const RATE_LIMIT_INDICATORS: &[&str] = &["rate limit", "too many requests", "quota", "resource exhausted"];
const SERVER_FAULT_INDICATORS: &[&str] = &[
    "overloaded",
    "unavailable",
    "internal error",
    "server error",
    "bad gateway",
    "gateway timeout",
];

/// Retry class of a failed HTTP exchange, or `None` if it must not be retried.
pub fn classify_failure(status: u16, body: &str) -> Option<TransientKind> {
    match status {
        429 => return Some(TransientKind::RateLimit),
        500 | 502 | 503 | 504 => return Some(TransientKind::ServerFault),
        _ => {}
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let code = envelope.error.code.map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        let tokens = [code, envelope.error.status, envelope.error.kind];
        for token in tokens.iter().flatten() {
            let token = token.to_ascii_lowercase();
            if RATE_LIMIT_CODES.contains(&token.as_str()) {
                return Some(TransientKind::RateLimit);
            }
            if SERVER_FAULT_CODES.contains(&token.as_str()) {
                return Some(TransientKind::ServerFault);
            }
        }
    }

    let lowered = body.to_ascii_lowercase().replace('_', " ");
    if RATE_LIMIT_INDICATORS.iter().any(|needle| lowered.contains(needle)) {
        return Some(TransientKind::RateLimit);
    }
    if SERVER_FAULT_INDICATORS.iter().any(|needle| lowered.contains(needle)) {
        return Some(TransientKind::ServerFault);
    }
    None
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
