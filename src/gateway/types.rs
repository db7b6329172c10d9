//! OpenAI-compatible request/response types and the upstream wire format.

use serde::{Deserialize, Serialize};

/// Models the gateway accepts. Anything else is rejected before the
/// upstream call.
pub const SUPPORTED_MODELS: [&str; 4] = [
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-3-flash-preview",
    "gemini-3-pro-preview",
];

/// Temperature applied when the caller does not set one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Chat completion request (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Message roles the schema accepts; anything else fails deserialization
/// and surfaces as a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat completion response (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// A completion choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

/// The assistant message inside a choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

/// Token usage statistics. Always zero: the upstream exposes no counts and
/// the gateway does not estimate them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Streaming chunk response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// A streaming choice delta.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Delta content in a streaming response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Delta {
    pub role: String,
    pub content: String,
}

// ── Upstream wire format ──

/// Request body for the vendor endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamPayload {
    pub contents: Vec<UpstreamContent>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamContent {
    pub role: &'static str,
    pub parts: Vec<UpstreamPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig {
    pub temperature: f64,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Response body from the vendor endpoint. One line of a streamed reply
/// has the same shape.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamResponse {
    pub candidates: Option<Vec<Candidate>>,
}

/// One upstream-proposed response alternative.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<UpstreamPart>,
}

/// Translate an OpenAI-style request into the upstream payload.
///
/// System messages are dropped outright rather than mapped to a system
/// instruction; user and assistant messages keep their original order,
/// with "assistant" becoming the vendor's "model" role.
pub fn build_upstream_payload(request: &ChatCompletionRequest) -> UpstreamPayload {
    let contents = request
        .messages
        .iter()
        .filter_map(|message| {
            let role = match message.role {
                Role::System => return None,
                Role::User => "user",
                Role::Assistant => "model",
            };
            Some(UpstreamContent {
                role,
                parts: vec![UpstreamPart {
                    text: message.content.clone(),
                }],
            })
        })
        .collect();

    UpstreamPayload {
        contents,
        generation_config: GenerationConfig {
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_output_tokens: request.max_tokens,
        },
    }
}

/// Convert a non-streaming upstream body into an OpenAI-style response.
///
/// Takes the first candidate's first text part; the finish reason defaults
/// to "stop". A body with no `candidates` field at all yields a fixed
/// placeholder rather than an error.
pub fn to_chat_response(
    upstream: UpstreamResponse,
    model: &str,
    created: i64,
) -> ChatCompletionResponse {
    let (content, finish_reason) = match upstream.candidates.and_then(|mut c| {
        if c.is_empty() {
            None
        } else {
            Some(c.swap_remove(0))
        }
    }) {
        Some(candidate) => {
            let text = candidate
                .content
                .unwrap_or_default()
                .parts
                .first()
                .map(|p| p.text.clone())
                .unwrap_or_default();
            let reason = candidate.finish_reason.unwrap_or_else(|| "stop".to_string());
            (text, reason)
        }
        None => ("No response from Gemini".to_string(), "stop".to_string()),
    };

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", created),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason,
        }],
        usage: Usage::default(),
    }
}
