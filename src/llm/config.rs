//! Configuration for the remote generative API

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling options used when starting a chat
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatOptions {
    /// Temperature for sampling
    pub temperature: f32,

    /// Top-p (nucleus) sampling parameter
    pub top_p: f32,

    /// Top-k sampling parameter
    pub top_k: u32,

    /// Ground replies with web search
    pub use_search: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            use_search: false,
        }
    }
}

impl ChatOptions {
    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set top-p sampling
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set top-k sampling
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Enable or disable search grounding
    pub fn with_search(mut self, use_search: bool) -> Self {
        self.use_search = use_search;
        self
    }
}

/// Connection and model settings for the gateway
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// API credential; required before the gateway can be built
    pub api_key: Option<String>,

    /// REST endpoint root
    pub base_url: String,

    /// Live (bidirectional) endpoint
    pub live_url: String,

    pub chat_model: String,
    pub vision_model: String,
    pub refine_model: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub live_model: String,

    /// Prebuilt voice used for read-aloud
    pub speech_voice: String,

    /// Prebuilt voice used in live sessions
    pub live_voice: String,

    /// Temperature for refine requests
    pub refine_temperature: f32,

    /// Deadline for one request, and for the gap between streamed deltas
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            chat_model: "gemini-3-flash-preview".to_string(),
            vision_model: "gemini-3-pro-preview".to_string(),
            refine_model: "gemini-3-pro-preview".to_string(),
            transcription_model: "gemini-3-flash-preview".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            live_model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            speech_voice: "Kore".to_string(),
            live_voice: "Zephyr".to_string(),
            refine_temperature: 0.5,
            request_timeout_secs: 60,
        }
    }
}

impl GatewayConfig {
    /// Create a configuration with the given credential
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Set the REST endpoint root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the chat model
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The credential, if present and non-blank
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}
