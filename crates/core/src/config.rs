use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Base HTTP endpoint of the browser's remote-debugging listener.
    #[serde(default = "default_cdp_endpoint")]
    pub cdp_endpoint: String,
    /// Poll interval for the active-tab watcher, in milliseconds.
    #[serde(default = "default_active_tab_poll_ms")]
    pub active_tab_poll_ms: u64,
}

fn default_cdp_endpoint() -> String {
    "http://127.0.0.1:9222".to_string()
}

fn default_active_tab_poll_ms() -> u64 {
    1000
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            cdp_endpoint: default_cdp_endpoint(),
            active_tab_poll_ms: default_active_tab_poll_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Per-tab cap on stored calls; appending past it evicts the oldest.
    #[serde(default = "default_max_calls_per_tab")]
    pub max_calls_per_tab: usize,
    /// Most-recent completed calls the panel ships to /chat.
    #[serde(default = "default_chat_call_limit")]
    pub chat_call_limit: usize,
    /// Most-recent calls actually formatted into the model prompt.
    #[serde(default = "default_prompt_call_limit")]
    pub prompt_call_limit: usize,
}

fn default_max_calls_per_tab() -> usize {
    200
}

fn default_chat_call_limit() -> usize {
    100
}

fn default_prompt_call_limit() -> usize {
    30
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_calls_per_tab: default_max_calls_per_tab(),
            chat_call_limit: default_chat_call_limit(),
            prompt_call_limit: default_prompt_call_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Model name; an "ollama/" prefix is tolerated and stripped.
    #[serde(default = "default_model")]
    pub model: String,
    /// Override for the model runtime's base URL.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "ollama/llama3.2".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn gateway_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}
