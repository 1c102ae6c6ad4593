//! OpenAI-compatible LLM provider.
//!
//! Serves both OpenAI and Groq; the two differ only in base URL and model list.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::error::{LLMError, check_response};
use super::provider::{ClientOptions, LLMProvider, Provider, select_model};
use super::sse::{Decoded, FragmentStream, SseDecoder, SseEvent};
use super::types::{ChatResponse, ChatStream, Message, Role, Usage};
use super::validate::validate_messages;

/// OpenAI-compatible provider.
pub struct OpenAICompatibleProvider {
    client: Client,
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAICompatibleProvider {
    pub fn new(
        provider: Provider,
        api_key: String,
        model: String,
        options: &ClientOptions,
    ) -> Result<Self, LLMError> {
        Ok(Self {
            client: options.build_client()?,
            provider,
            base_url: options.resolve_base_url(provider),
            api_key,
            model,
        })
    }

    fn label(&self) -> &'static str {
        self.provider.label()
    }

    fn to_request(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
        stream: bool,
    ) -> Request {
        Request {
            model: self.model.clone(),
            messages: build_messages(messages, system_prompt),
            temperature,
            max_tokens: self.provider.descriptor().max_tokens,
            stream: stream.then_some(true),
        }
    }

    async fn send(&self, request: &Request) -> Result<reqwest::Response, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LLMError::transport(self.label(), e))?;
        check_response(self.label(), response).await
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> Result<(), LLMError> {
        self.model = select_model(self.provider, model)?;
        Ok(())
    }

    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatResponse, LLMError> {
        validate_messages(messages)?;
        let request = self.to_request(messages, system_prompt, temperature, false);

        debug!(provider = %self.provider, model = %self.model, messages = request.messages.len(), "chat request");
        let response = self.send(&request).await?;
        let body: Response = response
            .json()
            .await
            .map_err(|e| LLMError::transport(self.label(), e))?;

        from_response(self.label(), body)
    }

    async fn stream(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatStream, LLMError> {
        validate_messages(messages)?;
        let request = self.to_request(messages, system_prompt, temperature, true);

        debug!(provider = %self.provider, model = %self.model, "stream request");
        let response = self.send(&request).await?;
        let stream = FragmentStream::new(
            response.bytes_stream(),
            StreamDecoder {
                provider: self.label(),
            },
            self.label(),
        );

        Ok(Box::pin(stream))
    }

    async fn validate_key(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let response = match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(provider = %self.provider, status = r.status().as_u16(), "key rejected");
                return false;
            }
            Err(e) => {
                debug!(provider = %self.provider, error = %e, "key validation failed");
                return false;
            }
        };
        response.json::<ModelList>().await.is_ok()
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(serde::Serialize)]
struct Request {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(serde::Deserialize)]
struct Response {
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(serde::Deserialize)]
struct ResponseUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(serde::Deserialize)]
#[expect(dead_code, reason = "only the shape is checked")]
struct ModelList {
    data: Vec<serde_json::Value>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Prepend the system prompt as a leading `system` message.
fn build_messages(messages: &[Message], system_prompt: Option<&str>) -> Vec<Message> {
    let mut result = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt
        && !prompt.is_empty()
    {
        result.push(Message::new(Role::System, prompt));
    }
    result.extend_from_slice(messages);
    result
}

fn from_response(provider: &'static str, response: Response) -> Result<ChatResponse, LLMError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| LLMError::unsupported_content(provider, "no response content received"))?;

    Ok(ChatResponse {
        content,
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

// ============================================================================
// Streaming
// ============================================================================

struct StreamDecoder {
    provider: &'static str,
}

impl SseDecoder for StreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Decoded, LLMError> {
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(Decoded::Skip);
        }
        if data == "[DONE]" {
            return Ok(Decoded::Finished);
        }

        let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
            LLMError::unsupported_content(self.provider, format!("malformed stream chunk: {e}"))
        })?;

        if let Some(error) = chunk.error {
            return Err(LLMError::Transport {
                provider: self.provider,
                message: error.message,
            });
        }

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .map_or(Decoded::Skip, Decoded::Fragment))
    }
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(serde::Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(serde::Deserialize)]
struct StreamError {
    message: String,
}
