use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use trafficlens_core::types::{ChatMessage, LLMReply};
use trafficlens_core::{Error, Result};

use crate::client::build_http_client;
use crate::Provider;

const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

pub struct OllamaProvider {
    client: Client,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(api_base: Option<&str>, model: &str, max_tokens: u32, temperature: f32) -> Self {
        let resolved_base = api_base
            .unwrap_or(DEFAULT_OLLAMA_BASE)
            .trim_end_matches('/')
            .to_string();
        // local inference can be slow on a cold model
        let client = build_http_client(Duration::from_secs(300));
        Self {
            client,
            api_base: resolved_base,
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    /// Strip "ollama/" prefix from model names.
    /// Config may store "ollama/llama3" but the API expects "llama3".
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("ollama/").unwrap_or(model)
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.clone(),
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMReply> {
        let url = format!("{}/api/chat", self.api_base);
        let model = Self::normalize_model(&self.model);
        let ollama_messages = Self::convert_messages(messages);

        let request = serde_json::json!({
            "model": model,
            "messages": ollama_messages,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            }
        });

        info!(
            url = %url,
            model = %model,
            messages_count = messages.len(),
            "Calling Ollama API"
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Ollama API error");
            return Err(Error::Provider(format!(
                "Ollama API error {}: {}",
                status, raw_body
            )));
        }

        debug!(body_len = raw_body.len(), "Ollama raw response");

        let resp: OllamaChatResponse = serde_json::from_str(&raw_body).map_err(|e| {
            let preview_end = raw_body
                .char_indices()
                .nth(500)
                .map(|(i, _)| i)
                .unwrap_or(raw_body.len());
            Error::Provider(format!(
                "Failed to parse Ollama response: {}. Body: {}",
                e,
                &raw_body[..preview_end]
            ))
        })?;

        let content = resp.message.content;

        let usage = serde_json::json!({
            "prompt_tokens": resp.prompt_eval_count,
            "completion_tokens": resp.eval_count,
        });

        let finish_reason = if resp.done.unwrap_or(true) {
            "stop".to_string()
        } else {
            "length".to_string()
        };

        Ok(LLMReply {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            finish_reason,
            usage,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[allow(dead_code)]
    role: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_model() {
        assert_eq!(OllamaProvider::normalize_model("ollama/llama3"), "llama3");
        assert_eq!(OllamaProvider::normalize_model("qwen2.5:7b"), "qwen2.5:7b");
    }

    #[test]
    fn test_convert_messages() {
        let messages = vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there"),
        ];

        let converted = OllamaProvider::convert_messages(&messages);
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[0].content, "You are helpful");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].role, "assistant");
    }

    #[test]
    fn test_parse_response() {
        let json = r#"{
            "model": "llama3",
            "message": {
                "role": "assistant",
                "content": "That request fetched the order list."
            },
            "done": true,
            "prompt_eval_count": 50,
            "eval_count": 20
        }"#;

        let resp: OllamaChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "That request fetched the order list.");
        assert_eq!(resp.done, Some(true));
        assert_eq!(resp.prompt_eval_count, Some(50));
    }
}
