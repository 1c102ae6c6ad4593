//! Provider construction and credential checks.

use tracing::{debug, warn};

use super::anthropic::AnthropicProvider;
use super::error::LLMError;
use super::gemini::GeminiProvider;
use super::openai::OpenAICompatibleProvider;
use super::provider::{ClientOptions, LLMProvider, Provider, ProviderDescriptor};

/// Builds provider adapters from an identifier, key, and optional model.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create an adapter with default transport settings.
    pub fn create(
        provider: &str,
        api_key: &str,
        model: Option<&str>,
    ) -> Result<Box<dyn LLMProvider>, LLMError> {
        Self::create_with(provider, api_key, model, &ClientOptions::default())
    }

    pub fn create_with(
        provider: &str,
        api_key: &str,
        model: Option<&str>,
        options: &ClientOptions,
    ) -> Result<Box<dyn LLMProvider>, LLMError> {
        if api_key.is_empty() {
            return Err(LLMError::MissingCredential(provider.to_string()));
        }
        let provider: Provider = provider.parse()?;
        let descriptor = provider.descriptor();

        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or(descriptor.default_model);
        if !descriptor.supports(model) {
            // Accept it; the backend decides whether it exists.
            warn!(provider = %provider, model, "model is not in the supported list");
        }

        let api_key = api_key.to_string();
        let model = model.to_string();
        debug!(provider = %provider, model = %model, "creating provider");

        let adapter: Box<dyn LLMProvider> = match provider {
            Provider::OpenAI | Provider::Groq => Box::new(OpenAICompatibleProvider::new(
                provider, api_key, model, options,
            )?),
            Provider::Claude => Box::new(AnthropicProvider::new(api_key, model, options)?),
            Provider::Gemini => Box::new(GeminiProvider::new(api_key, model, options)?),
        };
        Ok(adapter)
    }

    pub fn supported_providers() -> Vec<&'static str> {
        Provider::ALL.iter().map(|p| p.id()).collect()
    }

    pub fn provider_config(provider: &str) -> Option<&'static ProviderDescriptor> {
        provider.parse::<Provider>().ok().map(|p| p.descriptor())
    }

    /// Prefix check only. A matching key may still be rejected by the backend.
    pub fn validate_api_key_format(provider: &str, api_key: &str) -> bool {
        Self::provider_config(provider).is_some_and(|d| api_key.starts_with(d.key_prefix))
    }

    /// Build a throwaway adapter and probe the key. Any failure is `false`.
    pub async fn validate_provider(provider: &str, api_key: &str, model: Option<&str>) -> bool {
        Self::validate_provider_with(provider, api_key, model, &ClientOptions::default()).await
    }

    pub async fn validate_provider_with(
        provider: &str,
        api_key: &str,
        model: Option<&str>,
        options: &ClientOptions,
    ) -> bool {
        match Self::create_with(provider, api_key, model, options) {
            Ok(adapter) => adapter.validate_key().await,
            Err(e) => {
                debug!(provider, error = %e, "provider construction failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_uses_descriptor_default_model() {
        for provider in Provider::ALL {
            let adapter = ProviderFactory::create(provider.id(), "key", None).unwrap();
            assert_eq!(adapter.provider(), provider);
            assert_eq!(adapter.model(), provider.descriptor().default_model);
        }
    }

    #[test]
    fn create_keeps_explicit_model() {
        let adapter = ProviderFactory::create("groq", "gsk_1", Some("gemma2-9b-it")).unwrap();
        assert_eq!(adapter.model(), "gemma2-9b-it");

        let adapter = ProviderFactory::create("openai", "sk-1", Some("gpt-5-preview")).unwrap();
        assert_eq!(adapter.model(), "gpt-5-preview");
    }

    #[test]
    fn create_requires_credential() {
        let err = ProviderFactory::create("claude", "", None).err().unwrap();
        assert!(matches!(err, LLMError::MissingCredential(ref p) if p == "claude"));
    }

    #[test]
    fn create_rejects_unknown_provider() {
        let err = ProviderFactory::create("mistral", "key", None).err().unwrap();
        assert_eq!(err.to_string(), "unsupported LLM provider: mistral");
    }

    #[test]
    fn supported_models_match_descriptor_and_are_stable() {
        for provider in Provider::ALL {
            let adapter = ProviderFactory::create(provider.id(), "key", None).unwrap();
            let first = adapter.supported_models();
            let second = adapter.supported_models();
            assert_eq!(first, second);
            assert_eq!(first, provider.descriptor().models);
        }
    }

    #[test]
    fn api_key_format_checks_prefix() {
        assert!(ProviderFactory::validate_api_key_format("claude", "sk-ant-xyz"));
        assert!(!ProviderFactory::validate_api_key_format("claude", "sk-xyz"));
        assert!(ProviderFactory::validate_api_key_format("openai", "sk-abc"));
        assert!(ProviderFactory::validate_api_key_format("groq", "gsk_abc"));
        assert!(ProviderFactory::validate_api_key_format("gemini", "AIzaSy"));
        assert!(!ProviderFactory::validate_api_key_format("mistral", "sk-abc"));
    }

    #[test]
    fn lists_providers_in_order() {
        assert_eq!(
            ProviderFactory::supported_providers(),
            vec!["openai", "claude", "gemini", "groq"]
        );
        assert_eq!(
            ProviderFactory::provider_config("gemini").unwrap().max_tokens,
            8192
        );
        assert!(ProviderFactory::provider_config("nope").is_none());
    }

    #[tokio::test]
    async fn validate_provider_collapses_failures() {
        assert!(!ProviderFactory::validate_provider("claude", "", None).await);
        assert!(!ProviderFactory::validate_provider("mistral", "key", None).await);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(401)
            .create_async()
            .await;
        let options = ClientOptions::default().with_base_url(server.url());
        assert!(!ProviderFactory::validate_provider_with("openai", "sk-bad", None, &options).await);
    }

    #[tokio::test]
    async fn validate_provider_accepts_good_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(r#"{"object": "list", "data": [{"id": "llama-3.3-70b-versatile"}]}"#)
            .create_async()
            .await;
        let options = ClientOptions::default().with_base_url(server.url());
        assert!(ProviderFactory::validate_provider_with("groq", "gsk_ok", None, &options).await);
    }
}
