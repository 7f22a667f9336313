use async_trait::async_trait;
use imaginize_core::{ChapterSpec, EntityType};
use serde::{Deserialize, Serialize};

use crate::error::AiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDraft {
    pub page_range: String,
    pub source_quote: String,
    pub visual_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDraft {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub scenes: Vec<SceneDraft>,
    pub entities: Vec<EntityDraft>,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveEntityResponse {
    pub is_match: bool,
    pub confidence: f32,
    pub reasoning: String,
}

/// Normalized interface over chat + image providers (spec §4.4). Provider
/// selection happens once at startup (`detect_provider`); callers only
/// ever see this trait.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// A single model call returning both scenes and entities for one
    /// chapter (spec §4.4: "why one unified analyze call").
    async fn analyze_chapter_unified(
        &self,
        chapter: &ChapterSpec,
        element_context: &str,
        num_scenes: u32,
    ) -> Result<AnalyzeResponse, AiError>;

    /// Confidence-scored entity match, always consulted through the cache
    /// (C5) by the caller before this is invoked (spec §4.5).
    async fn resolve_entity(
        &self,
        new_name: &str,
        new_type: EntityType,
        candidate_name: &str,
        candidate_description: &str,
    ) -> Result<ResolveEntityResponse, AiError>;

    /// Optional: collapses multiple enrichment entries into one coherent
    /// paragraph. Callers fall back to simple append-with-separator when
    /// this is not enabled (spec §4.4).
    async fn enrich_description(&self, base: &str, new_details: &[String]) -> Result<String, AiError>;

    /// Returns PNG bytes. Implementations that only yield a URL must
    /// download before returning (spec §4.4).
    async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError>;

    fn model_id(&self) -> &str;
}
