use imaginize_core::Tier;

/// Concrete provider families this facade can dispatch to (spec §9:
/// "Dynamic dispatch on provider").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Claude,
    OpenAi,
    Gemini,
    Ollama,
}

/// Pure function of model-id string and base URL (spec §9). Ollama is
/// detected by base URL since its model ids otherwise look arbitrary
/// (user-supplied local model names).
pub fn detect_provider(model_id: &str, base_url: Option<&str>) -> ProviderKind {
    if let Some(url) = base_url {
        let url_lower = url.to_lowercase();
        if url_lower.contains("ollama") || url_lower.contains("11434") || url_lower.contains("localhost")
        {
            return ProviderKind::Ollama;
        }
    }
    let model_lower = model_id.to_lowercase();
    if model_lower.starts_with("claude") {
        ProviderKind::Claude
    } else if model_lower.starts_with("gemini") {
        ProviderKind::Gemini
    } else {
        ProviderKind::OpenAi
    }
}

/// Fallback-only heuristic per Redesign Flag #4: the explicit `tier` field
/// in config is authoritative; this is only consulted when it is unset.
pub fn detect_tier_from_model_id(model_id: &str) -> Tier {
    if model_id.to_lowercase().contains(":free") {
        Tier::Free
    } else {
        Tier::Paid
    }
}
