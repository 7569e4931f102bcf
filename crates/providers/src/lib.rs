pub mod client;
pub mod ollama;

use async_trait::async_trait;
use trafficlens_core::types::{ChatMessage, LLMReply};
use trafficlens_core::Result;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMReply>;
}

pub use client::build_http_client;
pub use ollama::OllamaProvider;
