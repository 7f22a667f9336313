use async_trait::async_trait;
use imaginize_core::{ChapterSpec, EntityType};

use crate::chat_backend::ChatBackend;
use crate::error::AiError;
use crate::json_extract::extract_json;
use crate::provider::{AiProvider, AnalyzeResponse, ResolveEntityResponse};
use crate::prompts;

/// Implements the normalized `AiProvider` surface over any `ChatBackend`,
/// owning prompt construction and response parsing.
pub struct Engine<B: ChatBackend> {
    backend: B,
    temperature: f32,
    max_tokens: u32,
}

impl<B: ChatBackend> Engine<B> {
    pub fn new(backend: B, temperature: f32, max_tokens: u32) -> Self {
        Engine {
            backend,
            temperature,
            max_tokens,
        }
    }

    /// Calls the backend and parses a JSON object out of the response,
    /// re-prompting once on parse failure before surfacing `BadResponse`
    /// (spec §4.4: "unparseable JSON after one re-prompt").
    async fn complete_json(&self, system: &str, user: &str) -> Result<(serde_json::Value, u64), AiError> {
        let (raw, tokens) = self.backend.complete(Some(system), user, self.temperature, self.max_tokens).await?;
        if let Some(parsed) = try_parse(&raw) {
            return Ok((parsed, tokens));
        }

        tracing::warn!("model response was not valid JSON, re-prompting once");
        let reprompt_user = format!(
            "{user}\n\nYour previous response could not be parsed as JSON. \
             Respond with ONLY the JSON object, no other text."
        );
        let (raw2, tokens2) = self
            .backend
            .complete(Some(system), &reprompt_user, self.temperature, self.max_tokens)
            .await?;
        match try_parse(&raw2) {
            Some(parsed) => Ok((parsed, tokens + tokens2)),
            None => Err(AiError::BadResponse(raw2)),
        }
    }
}

fn try_parse(raw: &str) -> Option<serde_json::Value> {
    let candidate = extract_json(raw)?;
    serde_json::from_str(&candidate).ok()
}

#[async_trait]
impl<B: ChatBackend> AiProvider for Engine<B> {
    async fn analyze_chapter_unified(
        &self,
        chapter: &ChapterSpec,
        element_context: &str,
        num_scenes: u32,
    ) -> Result<AnalyzeResponse, AiError> {
        let system = prompts::analyze_system_prompt();
        let user = prompts::analyze_user_prompt(chapter, element_context, num_scenes);
        let (value, tokens) = self.complete_json(&system, &user).await?;

        let mut response: AnalyzeResponse = serde_json::from_value(value)
            .map_err(|e| AiError::BadResponse(e.to_string()))?;
        response.tokens_used = tokens;
        Ok(response)
    }

    async fn resolve_entity(
        &self,
        new_name: &str,
        new_type: EntityType,
        candidate_name: &str,
        candidate_description: &str,
    ) -> Result<ResolveEntityResponse, AiError> {
        let system = prompts::resolve_entity_system_prompt();
        let user = prompts::resolve_entity_user_prompt(
            new_name,
            &new_type.to_string(),
            candidate_name,
            candidate_description,
        );
        let (value, _tokens) = self.complete_json(&system, &user).await?;
        serde_json::from_value(value).map_err(|e| AiError::BadResponse(e.to_string()))
    }

    async fn enrich_description(&self, base: &str, new_details: &[String]) -> Result<String, AiError> {
        let system = prompts::enrich_description_system_prompt();
        let user = prompts::enrich_description_user_prompt(base, new_details);
        let (text, _tokens) = self
            .backend
            .complete(Some(&system), &user, self.temperature, self.max_tokens)
            .await?;
        Ok(text.trim().to_string())
    }

    async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError> {
        self.backend.generate_image(prompt, size).await
    }

    fn model_id(&self) -> &str {
        self.backend.model_id()
    }
}
