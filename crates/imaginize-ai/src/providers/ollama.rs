use async_trait::async_trait;
use serde_json::json;

use crate::chat_backend::ChatBackend;
use crate::error::AiError;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local Ollama server. No auth header, OpenAI-shaped `/api/chat` body.
/// Ollama has no image-generation endpoint; `generate_image` always
/// returns `NotConfigured` so callers fail fast rather than hang.
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(model: String, base_url: Option<String>) -> Self {
        OllamaProvider {
            client: reqwest::Client::new(),
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaProvider {
    async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f32,
        _max_tokens: u32,
    ) -> Result<(String, u64), AiError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": user}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {"temperature": temperature},
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
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
        let text = value["message"]["content"]
            .as_str()
            .ok_or_else(|| AiError::BadResponse("missing message.content".into()))?
            .to_string();
        let tokens = value["eval_count"].as_u64().unwrap_or(0)
            + value["prompt_eval_count"].as_u64().unwrap_or(0);

        Ok((text, tokens))
    }

    async fn generate_image(&self, _prompt: &str, _size: &str) -> Result<Vec<u8>, AiError> {
        Err(AiError::NotConfigured(
            "ollama backend has no image-generation endpoint".to_string(),
        ))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
