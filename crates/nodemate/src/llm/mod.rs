//! LLM provider clients for chat completions.

mod anthropic;
mod error;
mod factory;
mod gemini;
mod openai;
mod provider;
mod sse;
mod types;
mod validate;

pub use anthropic::AnthropicProvider;
pub use error::LLMError;
pub use factory::ProviderFactory;
pub use gemini::GeminiProvider;
pub use openai::OpenAICompatibleProvider;
pub use provider::{
    ClientOptions, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT, LLMProvider, Provider,
    ProviderDescriptor,
};
pub use sse::{SseEvent, SseEventStream};
pub use types::{ChatResponse, ChatStream, Message, Role, Usage};
pub use validate::{ValidationError, validate_messages};
