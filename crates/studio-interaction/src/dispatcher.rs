//! Message dispatcher backed by the Groq chat completions API.
//!
//! One POST per dispatched turn, no internal retries, no streaming. The full
//! prior turn sequence is replayed on every call so the provider sees the
//! whole dialogue; this policy is applied consistently for every dispatch.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};

use studio_core::{DispatchError, DispatchRequest, Dispatcher, Sender};

use crate::config::GroqConfig;

/// Dispatcher implementation that talks to the Groq HTTP API.
#[derive(Clone)]
pub struct GroqDispatcher {
    client: Client,
    config: GroqConfig,
}

impl GroqDispatcher {
    pub fn new(config: GroqConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Dispatcher for GroqDispatcher {
    async fn dispatch(&self, request: DispatchRequest<'_>) -> Result<String, DispatchError> {
        let body = build_request_body(&request);

        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .json(&body)
            .send()
            .await
            .map_err(|err| DispatchError::NetworkFailure(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read provider error body".to_string());
            let err = map_http_error(request.model.as_str(), status, &body_text);
            tracing::debug!(status = status.as_u16(), "dispatch rejected: {err}");
            return Err(err);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|_| DispatchError::EmptyResponse)?;
        extract_reply(parsed)
    }
}

fn build_request_body(request: &DispatchRequest<'_>) -> ChatCompletionRequest {
    let mut messages: Vec<ChatMessage> = request
        .prior_turns
        .iter()
        .map(|turn| ChatMessage {
            role: role_of(turn.sender),
            content: turn_content(&turn.text, turn.attachment.as_ref()),
        })
        .collect();

    messages.push(ChatMessage {
        role: "user",
        content: turn_content(request.text, request.attachment),
    });

    ChatCompletionRequest {
        model: request.model.as_str().to_string(),
        messages,
    }
}

fn role_of(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Assistant => "assistant",
    }
}

/// Builds the content parts for one message: the text (when non-empty) and
/// the attachment as a base64 data URL. Turns always carry at least one of
/// the two.
fn turn_content(
    text: &str,
    attachment: Option<&studio_core::AttachmentRef>,
) -> Vec<MessageContent> {
    let mut parts = Vec::new();

    if !text.trim().is_empty() {
        parts.push(MessageContent::Text {
            text: text.to_string(),
        });
    }

    if let Some(attachment) = attachment {
        // The payload is already base64; the provider accepts or rejects it.
        parts.push(MessageContent::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", attachment.media_type, attachment.data),
            },
        });
    }

    parts
}

/// Normalizes a non-2xx provider response into the dispatch taxonomy.
fn map_http_error(model: &str, status: StatusCode, body: &str) -> DispatchError {
    let (message, code) = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| (wrapper.error.message, wrapper.error.code))
        .unwrap_or_else(|_| (body.to_string(), None));

    let model_rejected = code.as_deref() == Some("model_not_found")
        || ((status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND)
            && message.contains(model));
    if model_rejected {
        return DispatchError::InvalidModel(message);
    }

    DispatchError::ProviderError {
        status: Some(status.as_u16()),
        message,
    }
}

fn extract_reply(response: ChatCompletionResponse) -> Result<String, DispatchError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(DispatchError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<MessageContent>,
}

enum MessageContent {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

// The wire shape is a tagged map; serde's derive cannot express the
// `type` discriminator next to differently-named value keys.
impl Serialize for MessageContent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        match self {
            MessageContent::Text { text } => {
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
            }
            MessageContent::ImageUrl { image_url } => {
                map.serialize_entry("type", "image_url")?;
                map.serialize_entry("image_url", image_url)?;
            }
        }
        map.end()
    }
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}
