//! Google Gemini provider using the `generateContent` REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LLMError, check_response};
use super::provider::{ClientOptions, LLMProvider, Provider, select_model};
use super::sse::{Decoded, FragmentStream, SseDecoder, SseEvent};
use super::types::{ChatResponse, ChatStream, Message, Role};
use super::validate::validate_messages;

const LABEL: &str = "Gemini";

/// Acknowledgement turn that follows the injected system instructions.
const SYSTEM_ACK: &str = "Understood. I will follow these instructions.";

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, options: &ClientOptions) -> Result<Self, LLMError> {
        Ok(Self {
            client: options.build_client()?,
            base_url: options.resolve_base_url(Provider::Gemini),
            api_key,
            model,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    async fn generate(&self, body: &Request) -> Result<GenerateResponse, LLMError> {
        let response = self
            .client
            .post(self.endpoint("generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LLMError::transport(LABEL, e))?;
        let response = check_response(LABEL, response).await?;

        response
            .json()
            .await
            .map_err(|e| LLMError::transport(LABEL, e))
    }

    fn generation_config(&self, temperature: f32) -> GenerationConfig {
        GenerationConfig {
            temperature,
            max_output_tokens: Provider::Gemini.descriptor().max_tokens,
        }
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> Result<(), LLMError> {
        self.model = select_model(Provider::Gemini, model)?;
        Ok(())
    }

    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatResponse, LLMError> {
        validate_messages(messages)?;
        let request = Request {
            contents: build_contents(messages, system_prompt),
            generation_config: Some(self.generation_config(temperature)),
        };

        debug!(model = %self.model, contents = request.contents.len(), "gemini chat request");
        let body = self.generate(&request).await?;
        let content = body.first_text();
        if content.is_empty() {
            return Err(LLMError::unsupported_content(
                LABEL,
                "no response content received",
            ));
        }

        // The API reports token counts, but they are not surfaced for this backend.
        Ok(ChatResponse {
            content,
            usage: None,
        })
    }

    async fn stream(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatStream, LLMError> {
        validate_messages(messages)?;
        let request = Request {
            contents: build_contents(messages, system_prompt),
            generation_config: Some(self.generation_config(temperature)),
        };

        debug!(model = %self.model, "gemini stream request");
        let response = self
            .client
            .post(self.endpoint("streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::transport(LABEL, e))?;
        let response = check_response(LABEL, response).await?;

        let stream = FragmentStream::new(response.bytes_stream(), StreamDecoder, LABEL);
        Ok(Box::pin(stream))
    }

    async fn validate_key(&self) -> bool {
        let request = Request {
            contents: build_contents(&[Message::user("Test")], None),
            generation_config: None,
        };

        match self.generate(&request).await {
            Ok(body) => !body.first_text().is_empty(),
            Err(e) => {
                debug!(error = %e, "gemini key validation failed");
                false
            }
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

fn text_content(role: &str, text: &str) -> Content {
    Content {
        role: role.to_string(),
        parts: vec![Part {
            text: text.to_string(),
        }],
    }
}

/// Gemini has only `user` and `model` roles. System instructions travel as a
/// leading user turn answered by a fixed model acknowledgement.
fn build_contents(messages: &[Message], system_prompt: Option<&str>) -> Vec<Content> {
    let mut contents = Vec::with_capacity(messages.len() + 2);

    if let Some(prompt) = system_prompt
        && !prompt.is_empty()
    {
        contents.push(text_content("user", &format!("System: {prompt}")));
        contents.push(text_content("model", SYSTEM_ACK));
    }

    contents.extend(messages.iter().map(|msg| {
        let role = match msg.role {
            Role::Assistant => "model",
            Role::User | Role::System => "user",
        };
        text_content(role, &msg.content)
    }));

    contents
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

        let chunk: StreamChunk = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(data = %event.data, error = %e, "failed to parse Gemini SSE chunk");
                return Ok(Decoded::Skip);
            }
        };

        if let Some(error) = chunk.error {
            return Err(match error.code {
                0 => LLMError::Transport {
                    provider: LABEL,
                    message: error.message,
                },
                status => LLMError::Api {
                    provider: LABEL,
                    status,
                    message: error.message,
                },
            });
        }

        let response = GenerateResponse {
            candidates: chunk.candidates,
        };
        let text = response.first_text();
        let finished = response
            .candidates
            .first()
            .is_some_and(|c| c.finish_reason.is_some());

        // The final chunk may still carry text alongside the finish reason.
        Ok(if finished {
            Decoded::Last(text)
        } else {
            Decoded::Fragment(text)
        })
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    const CHAT_PATH: &str = "/models/gemini-2.5-flash:generateContent";
    const STREAM_PATH: &str = "/models/gemini-2.5-flash:streamGenerateContent";

    fn provider_for(server: &mockito::Server) -> GeminiProvider {
        let options = ClientOptions::default().with_base_url(server.url());
        GeminiProvider::new(
            "AIza-test".to_string(),
            "gemini-2.5-flash".to_string(),
            &options,
        )
        .unwrap()
    }

    #[test]
    fn system_prompt_becomes_acknowledged_user_turn() {
        let history = vec![
            Message::user("install a logger"),
            Message::assistant("Try pino."),
            Message::new(Role::System, "note"),
        ];
        let contents = build_contents(&history, Some("You are NodeMate"));
        let json = serde_json::to_value(&contents).unwrap();

        assert_eq!(json[0]["role"], "user");
        assert_eq!(json[0]["parts"][0]["text"], "System: You are NodeMate");
        assert_eq!(json[1]["role"], "model");
        assert_eq!(json[1]["parts"][0]["text"], SYSTEM_ACK);
        assert_eq!(json[2]["role"], "user");
        assert_eq!(json[3]["role"], "model");
        assert_eq!(json[4]["role"], "user");
        assert_eq!(contents.len(), 5);
    }

    #[test]
    fn no_system_turns_without_prompt() {
        let contents = build_contents(&[Message::user("hi")], None);
        assert_eq!(contents.len(), 1);
        let contents = build_contents(&[Message::user("hi")], Some(""));
        assert_eq!(contents.len(), 1);
    }

    #[tokio::test]
    async fn chat_returns_text_without_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", CHAT_PATH)
            .match_header("x-goog-api-key", "AIza-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 8192}
            })))
            .with_status(200)
            .with_body(
                r#"{
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "Try "}, {"text": "pino."}]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
                }"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server);
        let response = provider
            .chat(&[Message::user("install a logger")], Some("be brief"), 0.7)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Try pino.");
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn chat_rejects_empty_candidates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", CHAT_PATH)
            .with_status(200)
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let err = provider_for(&server)
            .chat(&[Message::user("hi")], None, 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::UnsupportedContent { provider: "Gemini", .. }));
    }

    #[tokio::test]
    async fn chat_maps_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", CHAT_PATH)
            .with_status(400)
            .with_body("API key not valid")
            .create_async()
            .await;

        let err = provider_for(&server)
            .chat(&[Message::user("hi")], None, 0.7)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Gemini API error (status 400): API key not valid"
        );
    }

    #[tokio::test]
    async fn stream_ends_on_finish_reason() {
        let mut server = mockito::Server::new_async().await;
        let body = "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Try\"}]}}]}\r\n\r\n\
data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\" pino.\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n";
        let mock = server
            .mock("POST", STREAM_PATH)
            .match_query(mockito::Matcher::UrlEncoded("alt".into(), "sse".into()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = provider_for(&server)
            .stream(&[Message::user("hi")], None, 0.7)
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        mock.assert_async().await;
        assert_eq!(fragments, vec!["Try".to_string(), " pino.".to_string()]);
    }

    async fn stream_items(server: &mockito::Server) -> Vec<Result<String, LLMError>> {
        provider_for(server)
            .stream(&[Message::user("hi")], None, 0.7)
            .await
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn stream_cut_off_before_finish_reason_is_interrupted() {
        let mut server = mockito::Server::new_async().await;
        let body = "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Try\"}]}}]}\r\n\r\n\
data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\" pi\"}]}}]}\r\n\r\n";
        server
            .mock("POST", STREAM_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let items = stream_items(&server).await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), "Try");
        assert_eq!(items[1].as_ref().unwrap(), " pi");
        assert!(matches!(
            items[2],
            Err(LLMError::StreamInterrupted { provider: "Gemini" })
        ));
    }

    #[tokio::test]
    async fn stream_surfaces_error_chunks() {
        let mut server = mockito::Server::new_async().await;
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Partial\"}]}}]}\r\n\r\n\
data: {\"error\":{\"code\":429,\"message\":\"Resource exhausted\",\"status\":\"RESOURCE_EXHAUSTED\"}}\r\n\r\n";
        server
            .mock("POST", STREAM_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let items = stream_items(&server).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Partial");
        assert_eq!(
            items[1].as_ref().unwrap_err().to_string(),
            "Gemini API error (status 429): Resource exhausted"
        );
    }

    #[tokio::test]
    async fn stream_error_chunk_without_code_has_no_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", STREAM_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("data: {\"error\":{\"message\":\"backend unavailable\"}}\r\n\r\n")
            .create_async()
            .await;

        let items = stream_items(&server).await;

        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert!(matches!(err, LLMError::Transport { provider: "Gemini", .. }));
        assert_eq!(err.to_string(), "Gemini API error: backend unavailable");
    }

    #[tokio::test]
    async fn validate_key_requires_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", CHAT_PATH)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "Test"}]}]
            })))
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "ok"}]}}]}"#)
            .create_async()
            .await;
        assert!(provider_for(&server).validate_key().await);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", CHAT_PATH)
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": []}}]}"#)
            .create_async()
            .await;
        assert!(!provider_for(&server).validate_key().await);
    }
}
