use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;

use crate::chat_backend::ChatBackend;
use crate::error::AiError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Grounded on `llm::providers::claude::ClaudeProvider`: the `system`
/// field is top-level (not a message), auth via `x-api-key`.
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        ClaudeProvider {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ChatBackend for ClaudeProvider {
    async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<(String, u64), AiError> {
        let body = json!({
            "model": self.model,
            "system": system.unwrap_or_default(),
            "messages": [{"role": "user", "content": user}],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::ApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: serde_json::Value = resp.json().await?;
        let text = value["content"][0]["text"]
            .as_str()
            .ok_or_else(|| AiError::BadResponse("missing content[0].text".into()))?
            .to_string();
        let tokens = value["usage"]["input_tokens"].as_u64().unwrap_or(0)
            + value["usage"]["output_tokens"].as_u64().unwrap_or(0);

        Ok((text, tokens))
    }

    async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError> {
        // Claude's messages API returns inline base64 image data via the
        // image-generation beta rather than a separate endpoint.
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": format!("Generate an image: {prompt} (size {size})")}],
            "max_tokens": 1024,
        });

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::ApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: serde_json::Value = resp.json().await?;
        let b64 = value["content"][0]["source"]["data"]
            .as_str()
            .ok_or_else(|| AiError::BadResponse("missing inline image data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| AiError::BadResponse(format!("invalid base64 image data: {e}")))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
