use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic messages API.
    Claude,
    /// OpenAI chat-completions API.
    OpenAi,
}

/// Configuration for the LLM model behind an agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which wire format to speak.
    pub provider: LlmProvider,
    /// Model identifier sent to the provider.
    pub model_id: String,
    /// API key.
    pub api_key: String,
    /// Base URL override; defaults per provider.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Response token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl ModelConfig {
    /// The effective base URL for this provider.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
            }
        }
    }
}

/// Per-session resource limits enforced by the runner.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Maximum tool calls per session before the wrap-up message is sent.
    pub max_tool_calls: u32,
    /// Wall-clock budget per session.
    pub session_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_tool_calls: 30,
            session_timeout: Duration::from_secs(300),
        }
    }
}
