use async_trait::async_trait;

use crate::error::AiError;

/// The provider-specific half of the facade: wire format and HTTP
/// specifics only. Prompt construction and response parsing are shared
/// across all backends in `Engine` (see `engine.rs`).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Runs one chat-completion call, returning raw text and the
    /// model-reported token count.
    async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<(String, u64), AiError>;

    /// Returns PNG bytes; implementations that only receive a URL back
    /// from the provider must download it before returning.
    async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError>;

    fn model_id(&self) -> &str;
}
