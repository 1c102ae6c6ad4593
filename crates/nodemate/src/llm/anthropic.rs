//! Anthropic LLM provider with native API format.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::error::{LLMError, check_response};
use super::provider::{ClientOptions, LLMProvider, Provider, select_model};
use super::sse::{Decoded, FragmentStream, SseDecoder, SseEvent};
use super::types::{ChatResponse, ChatStream, Message, Role, Usage};
use super::validate::validate_messages;

const LABEL: &str = "Claude";

/// Anthropic provider with native API format.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
    model: String,
}

impl AnthropicProvider {
    pub const DEFAULT_API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: String, model: String, options: &ClientOptions) -> Result<Self, LLMError> {
        Ok(Self {
            client: options.build_client()?,
            base_url: options.resolve_base_url(Provider::Claude),
            api_key,
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            model,
        })
    }

    /// Build a POST request with auth headers.
    fn build_request(&self, body: &Request) -> reqwest::RequestBuilder {
        let url = format!("{}/messages", self.base_url);
        self.client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(body)
    }

    async fn send(&self, body: &Request) -> Result<reqwest::Response, LLMError> {
        let response = self
            .build_request(body)
            .send()
            .await
            .map_err(|e| LLMError::transport(LABEL, e))?;
        check_response(LABEL, response).await
    }

    fn max_tokens(&self) -> u32 {
        Provider::Claude.descriptor().max_tokens
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> Result<(), LLMError> {
        self.model = select_model(Provider::Claude, model)?;
        Ok(())
    }

    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatResponse, LLMError> {
        validate_messages(messages)?;
        let request = to_request(
            &self.model,
            messages,
            system_prompt,
            Some(temperature),
            self.max_tokens(),
            None,
        );

        debug!(model = %self.model, messages = request.messages.len(), "claude chat request");
        let response = self.send(&request).await?;
        let body: Response = response
            .json()
            .await
            .map_err(|e| LLMError::transport(LABEL, e))?;

        from_response(body)
    }

    async fn stream(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatStream, LLMError> {
        validate_messages(messages)?;
        let request = to_request(
            &self.model,
            messages,
            system_prompt,
            Some(temperature),
            self.max_tokens(),
            Some(true),
        );

        debug!(model = %self.model, "claude stream request");
        let response = self.send(&request).await?;
        let stream = FragmentStream::new(response.bytes_stream(), StreamDecoder, LABEL);

        Ok(Box::pin(stream))
    }

    async fn validate_key(&self) -> bool {
        let probe = [Message::user("Hi")];
        let request = to_request(&self.model, &probe, None, None, 1, None);

        match self.send(&request).await {
            Ok(response) => response.json::<Response>().await.is_ok(),
            Err(e) => {
                debug!(error = %e, "claude key validation failed");
                false
            }
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(serde::Serialize)]
struct Request {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(serde::Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(serde::Deserialize)]
struct Response {
    content: Vec<ResponseContent>,
    usage: ResponseUsage,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(serde::Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ============================================================================
// Conversions
// ============================================================================

/// Move system content into the top-level field; only user/assistant turns
/// remain in the message list.
fn to_request(
    model: &str,
    messages: &[Message],
    system_prompt: Option<&str>,
    temperature: Option<f32>,
    max_tokens: u32,
    stream: Option<bool>,
) -> Request {
    let mut system_parts: Vec<&str> = system_prompt
        .filter(|p| !p.is_empty())
        .into_iter()
        .collect();
    let mut request_messages = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(&msg.content),
            Role::User => request_messages.push(RequestMessage {
                role: "user",
                content: msg.content.clone(),
            }),
            Role::Assistant => request_messages.push(RequestMessage {
                role: "assistant",
                content: msg.content.clone(),
            }),
        }
    }

    Request {
        model: model.to_string(),
        max_tokens,
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
        messages: request_messages,
        temperature,
        stream,
    }
}

fn from_response(response: Response) -> Result<ChatResponse, LLMError> {
    let content = match response.content.into_iter().next() {
        Some(ResponseContent::Text { text }) if !text.is_empty() => text,
        Some(ResponseContent::Text { .. }) => {
            return Err(LLMError::unsupported_content(LABEL, "empty text block"));
        }
        Some(ResponseContent::Other) => {
            return Err(LLMError::unsupported_content(
                LABEL,
                "unexpected response type from Claude",
            ));
        }
        None => return Err(LLMError::unsupported_content(LABEL, "no content blocks")),
    };

    let usage = response.usage;
    Ok(ChatResponse {
        content,
        usage: Some(Usage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        }),
    })
}

// ============================================================================
// Streaming
// ============================================================================

struct StreamDecoder;

impl SseDecoder for StreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Decoded, LLMError> {
        if event.data.is_empty() {
            return Ok(Decoded::Skip);
        }

        match serde_json::from_str::<AnthropicStreamEvent>(&event.data) {
            Ok(AnthropicStreamEvent::ContentBlockDelta { delta }) => {
                Ok(delta.text.map_or(Decoded::Skip, Decoded::Fragment))
            }
            Ok(AnthropicStreamEvent::MessageStop) => Ok(Decoded::Finished),
            // In-stream errors arrive after a 200 response and carry no status.
            Ok(AnthropicStreamEvent::Error { error }) => Err(LLMError::Transport {
                provider: LABEL,
                message: format!("{}: {}", error.error_type, error.message),
            }),
            Ok(AnthropicStreamEvent::Unknown) => Ok(Decoded::Skip),
            Err(e) => {
                debug!(data = %event.data, error = %e, "failed to parse Anthropic SSE event");
                Ok(Decoded::Skip)
            }
        }
    }
}

/// Anthropic SSE stream events. Only text deltas, errors, and the stop
/// marker matter here.
#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(serde::Deserialize)]
struct Delta {
    /// Present on `text_delta` only.
    text: Option<String>,
}

#[derive(serde::Deserialize)]
struct StreamError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
