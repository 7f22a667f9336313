use std::sync::Mutex;

use async_trait::async_trait;
use imaginize_core::{AiConfig, ChapterSpec, EntityType};

use crate::detect::{detect_provider, ProviderKind};
use crate::engine::Engine;
use crate::error::AiError;
use crate::provider::{AiProvider, AnalyzeResponse, ResolveEntityResponse};
use crate::providers::{ClaudeProvider, GeminiProvider, OllamaProvider, OpenAiProvider};

/// Builds the concrete provider selected by `detect_provider`, wrapped in
/// the shared `Engine` (spec §9: provider detection is a pure function of
/// model-id and base URL, resolved once at startup).
pub fn build_provider(config: &AiConfig) -> Result<Box<dyn AiProvider>, AiError> {
    let kind = detect_provider(&config.model, config.base_url.as_deref());
    let api_key = || {
        config
            .api_key
            .clone()
            .ok_or_else(|| AiError::NotConfigured(format!("no API key configured for {kind:?}")))
    };

    let provider: Box<dyn AiProvider> = match kind {
        ProviderKind::Claude => Box::new(Engine::new(
            ClaudeProvider::new(api_key()?, config.model.clone(), config.base_url.clone()),
            config.temperature,
            config.max_tokens,
        )),
        ProviderKind::OpenAi => Box::new(Engine::new(
            OpenAiProvider::new(api_key()?, config.model.clone(), config.base_url.clone()),
            config.temperature,
            config.max_tokens,
        )),
        ProviderKind::Gemini => Box::new(Engine::new(
            GeminiProvider::new(api_key()?, config.model.clone(), config.base_url.clone()),
            config.temperature,
            config.max_tokens,
        )),
        ProviderKind::Ollama => Box::new(Engine::new(
            OllamaProvider::new(config.model.clone(), config.base_url.clone()),
            config.temperature,
            config.max_tokens,
        )),
    };

    Ok(provider)
}

/// Thin wrapper keeping a running per-book token total (spec §4.4). The
/// Catalog-shaping logic and scheduling live above this layer; this only
/// normalizes provider access and tallies tokens.
pub struct AiFacade {
    provider: Box<dyn AiProvider>,
    tokens_used_total: Mutex<u64>,
}

impl AiFacade {
    pub fn new(provider: Box<dyn AiProvider>) -> Self {
        AiFacade {
            provider,
            tokens_used_total: Mutex::new(0),
        }
    }

    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        Ok(AiFacade::new(build_provider(config)?))
    }

    pub async fn analyze_chapter_unified(
        &self,
        chapter: &ChapterSpec,
        element_context: &str,
        num_scenes: u32,
    ) -> Result<AnalyzeResponse, AiError> {
        let response = self
            .provider
            .analyze_chapter_unified(chapter, element_context, num_scenes)
            .await?;
        *self.tokens_used_total.lock().unwrap() += response.tokens_used;
        Ok(response)
    }

    pub async fn resolve_entity(
        &self,
        new_name: &str,
        new_type: EntityType,
        candidate_name: &str,
        candidate_description: &str,
    ) -> Result<ResolveEntityResponse, AiError> {
        self.provider
            .resolve_entity(new_name, new_type, candidate_name, candidate_description)
            .await
    }

    pub async fn enrich_description(&self, base: &str, new_details: &[String]) -> Result<String, AiError> {
        self.provider.enrich_description(base, new_details).await
    }

    pub async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError> {
        self.provider.generate_image(prompt, size).await
    }

    pub fn tokens_used_total(&self) -> u64 {
        *self.tokens_used_total.lock().unwrap()
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }
}

/// Lets callers (notably `imaginize-catalog::merge_entity`) depend on
/// `&dyn AiProvider` rather than the concrete facade, while still getting
/// token accounting for free.
#[async_trait]
impl AiProvider for AiFacade {
    async fn analyze_chapter_unified(
        &self,
        chapter: &ChapterSpec,
        element_context: &str,
        num_scenes: u32,
    ) -> Result<AnalyzeResponse, AiError> {
        AiFacade::analyze_chapter_unified(self, chapter, element_context, num_scenes).await
    }

    async fn resolve_entity(
        &self,
        new_name: &str,
        new_type: EntityType,
        candidate_name: &str,
        candidate_description: &str,
    ) -> Result<ResolveEntityResponse, AiError> {
        AiFacade::resolve_entity(self, new_name, new_type, candidate_name, candidate_description).await
    }

    async fn enrich_description(&self, base: &str, new_details: &[String]) -> Result<String, AiError> {
        AiFacade::enrich_description(self, base, new_details).await
    }

    async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError> {
        AiFacade::generate_image(self, prompt, size).await
    }

    fn model_id(&self) -> &str {
        AiFacade::model_id(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provider_requires_api_key_for_hosted_providers() {
        let config = AiConfig {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-5-20250929".into(),
            api_key: None,
            base_url: None,
            temperature: 0.4,
            max_tokens: 4096,
            image_size: "1024x1024".into(),
            http_timeout_secs: 120,
        };
        let result = build_provider(&config);
        assert!(matches!(result, Err(AiError::NotConfigured(_))));
    }

    #[test]
    fn build_provider_allows_ollama_without_api_key() {
        let config = AiConfig {
            provider: "ollama".into(),
            model: "llama3".into(),
            api_key: None,
            base_url: Some("http://localhost:11434".into()),
            temperature: 0.4,
            max_tokens: 4096,
            image_size: "1024x1024".into(),
            http_timeout_secs: 120,
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.model_id(), "llama3");
    }
}
