use async_trait::async_trait;
use serde_json::json;

use crate::chat_backend::ChatBackend;
use crate::error::AiError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Grounded on `llm::providers::openai::OpenAiProvider`: Bearer auth,
/// standard chat-completions body shape.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        OpenAiProvider {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiProvider {
    async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<(String, u64), AiError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": user}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AiError::BadResponse("missing choices[0].message.content".into()))?
            .to_string();
        let tokens = value["usage"]["total_tokens"].as_u64().unwrap_or(0);

        Ok((text, tokens))
    }

    async fn generate_image(&self, prompt: &str, size: &str) -> Result<Vec<u8>, AiError> {
        let body = json!({
            "model": "gpt-image-1",
            "prompt": prompt,
            "size": size,
        });

        let resp = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
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
        let url = value["data"][0]["url"]
            .as_str()
            .ok_or_else(|| AiError::BadResponse("missing data[0].url".into()))?;

        let image_resp = self.client.get(url).send().await?;
        Ok(image_resp.bytes().await?.to_vec())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
