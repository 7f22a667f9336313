use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;

use crate::chat_backend::ChatBackend;
use crate::error::AiError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini's `generateContent` endpoint. The request shape follows the
/// same `reqwest::Client` + `serde_json::json!` body-construction idiom as
/// the Claude/OpenAI providers it sits beside.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        GeminiProvider {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiProvider {
    async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<(String, u64), AiError> {
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": user}]}],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let resp = self.client.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::ApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: serde_json::Value = resp.json().await?;
        let text = value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| AiError::BadResponse("missing candidates[0].content.parts[0].text".into()))?
            .to_string();
        let tokens = value["usageMetadata"]["totalTokenCount"].as_u64().unwrap_or(0);

        Ok((text, tokens))
    }

    async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": format!("{prompt} (size {size})")}]}],
            "generationConfig": {"responseModalities": ["IMAGE"]},
        });
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let resp = self.client.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::ApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: serde_json::Value = resp.json().await?;
        let b64 = value["candidates"][0]["content"]["parts"][0]["inlineData"]["data"]
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
