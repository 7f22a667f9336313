use std::env;

/// Loads a `.env` file if present. No-op if absent.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Free vs. paid tier, per Redesign Flag #4: explicit config beats the
/// brittle `:free` substring heuristic. The substring heuristic still
/// exists (`imaginize_ai::detect::detect_tier_from_model_id`) but only as
/// a fallback when this is left unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

/// Top-level configuration, assembled once at CLI startup from environment
/// variables (after `load_dotenv`). One section struct per subsystem, no
/// profile-prefixing: this is a single-book CLI tool, not a multi-tenant
/// server, so there is exactly one profile.
#[derive(Debug, Clone)]
pub struct Config {
    pub ai: AiConfig,
    pub scheduler: SchedulerConfig,
    pub catalog: CatalogConfig,
    pub series: SeriesConfigDefaults,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            ai: AiConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            catalog: CatalogConfig::from_env(),
            series: SeriesConfigDefaults::from_env(),
        }
    }

    /// Structured summary emitted once at startup: several `tracing::info!`
    /// lines, one per section, secrets never logged.
    pub fn log_summary(&self) {
        tracing::info!(provider = %self.ai.provider, model = %self.ai.model, "ai config");
        tracing::info!(
            max_concurrency = self.scheduler.max_concurrency,
            tier = ?self.scheduler.tier,
            max_retries = self.scheduler.max_retries,
            "scheduler config"
        );
        tracing::info!(
            entity_match_confidence = self.catalog.entity_match_confidence,
            ai_description_enrichment = self.catalog.ai_description_enrichment,
            "catalog config"
        );
        tracing::info!(enabled = self.series.enabled, "series config");
    }

    /// Secret-redacted view suitable for embedding in a progress log or
    /// bug report.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "ai": {"provider": self.ai.provider, "model": self.ai.model},
            "scheduler": {
                "max_concurrency": self.scheduler.max_concurrency,
                "tier": self.scheduler.tier,
                "max_retries": self.scheduler.max_retries,
            },
            "catalog": {
                "entity_match_confidence": self.catalog.entity_match_confidence,
                "ai_description_enrichment": self.catalog.ai_description_enrichment,
            },
            "series": {"enabled": self.series.enabled, "merge_strategy": self.series.merge_strategy},
        })
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub image_size: String,
    pub http_timeout_secs: u64,
}

impl AiConfig {
    fn from_env() -> Self {
        AiConfig {
            provider: env_or("IMAGINIZE_AI_PROVIDER", "anthropic"),
            model: env_or("IMAGINIZE_AI_MODEL", "claude-sonnet-4-5-20250929"),
            api_key: env_opt("IMAGINIZE_AI_API_KEY"),
            base_url: env_opt("IMAGINIZE_AI_BASE_URL"),
            temperature: env_f32("IMAGINIZE_AI_TEMPERATURE", 0.4),
            max_tokens: env_u32("IMAGINIZE_AI_MAX_TOKENS", 4096),
            image_size: env_or("IMAGINIZE_AI_IMAGE_SIZE", "1024x1024"),
            http_timeout_secs: env_u64("IMAGINIZE_AI_HTTP_TIMEOUT_SECS", 120),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub tier: Option<Tier>,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub rate_limit_floor_ms: u64,
}

impl SchedulerConfig {
    fn from_env() -> Self {
        let tier = match env::var("IMAGINIZE_TIER").ok().as_deref() {
            Some("free") => Some(Tier::Free),
            Some("paid") => Some(Tier::Paid),
            _ => None,
        };
        SchedulerConfig {
            max_concurrency: env_u32("IMAGINIZE_MAX_CONCURRENCY", 3) as usize,
            tier,
            max_retries: env_u32("IMAGINIZE_MAX_RETRIES", 10),
            base_backoff_ms: env_u64("IMAGINIZE_BASE_BACKOFF_MS", 10_000),
            rate_limit_floor_ms: env_u64("IMAGINIZE_RATE_LIMIT_FLOOR_MS", 65_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub entity_match_confidence: f32,
    pub ai_description_enrichment: bool,
    pub pages_per_image: u32,
}

impl CatalogConfig {
    fn from_env() -> Self {
        CatalogConfig {
            entity_match_confidence: env_f32("IMAGINIZE_ENTITY_MATCH_CONFIDENCE", 0.7),
            ai_description_enrichment: env_bool("IMAGINIZE_AI_DESCRIPTION_ENRICHMENT", false),
            pages_per_image: env_u32("IMAGINIZE_PAGES_PER_IMAGE", 10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeriesConfigDefaults {
    pub enabled: bool,
    pub merge_strategy: String,
}

impl SeriesConfigDefaults {
    fn from_env() -> Self {
        SeriesConfigDefaults {
            enabled: env_bool("IMAGINIZE_SERIES_ENABLED", false),
            merge_strategy: env_or("IMAGINIZE_SERIES_MERGE_STRATEGY", "enrich"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_without_any_env() {
        // SAFETY: test-only, single-threaded within this module's test run.
        for key in [
            "IMAGINIZE_AI_PROVIDER",
            "IMAGINIZE_TIER",
            "IMAGINIZE_MAX_CONCURRENCY",
        ] {
            unsafe { env::remove_var(key) };
        }
        let config = Config::from_env();
        assert_eq!(config.ai.provider, "anthropic");
        assert_eq!(config.scheduler.max_concurrency, 3);
        assert!(config.scheduler.tier.is_none());
        assert_eq!(config.catalog.entity_match_confidence, 0.7);
    }

    #[test]
    fn explicit_tier_overrides_default() {
        unsafe { env::set_var("IMAGINIZE_TIER", "free") };
        let config = Config::from_env();
        assert_eq!(config.scheduler.tier, Some(Tier::Free));
        unsafe { env::remove_var("IMAGINIZE_TIER") };
    }
}
