//! Gateway implementation for the hosted Gemini API
//!
//! Plain request/response calls go to `:generateContent`; chat replies are
//! streamed from `:streamGenerateContent?alt=sse` one server-sent event at a
//! time.

use crate::llm::config::{ChatOptions, GatewayConfig};
use crate::llm::gateway::{
    clean_transcription, ChatHandle, Gateway, ImageAttachment, RefineAction, TextStream,
};
use crate::llm::live::{self, LiveCallbacks, LiveHandle};
use crate::llm::prompts::{SPEECH_PROMPT_PREFIX, SYSTEM_INSTRUCTION, TRANSCRIPTION_PROMPT};
use crate::messages::{Message, Role, TurnState};
use crate::{QurmaError, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const API_KEY_HEADER: &str = "x-goog-api-key";
const TRANSCRIPTION_MIME: &str = "audio/wav";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn inline(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    fn parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.parts().iter().filter_map(|p| p.text.as_deref()).collect()
    }

    fn inline_data(&self) -> Option<&str> {
        self.parts()
            .iter()
            .find_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.as_str())
    }
}

fn system_content() -> Content {
    Content::text(None, SYSTEM_INSTRUCTION)
}

/// Convert finished turns into request history
pub(crate) fn history_contents(messages: &[Message]) -> Vec<Content> {
    messages
        .iter()
        .filter(|m| m.state == TurnState::Complete && !m.text.trim().is_empty())
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            Content::text(Some(role), m.text.clone())
        })
        .collect()
}

/// Decode one server-sent event line into a text delta
pub(crate) fn parse_sse_line(line: &[u8]) -> Result<Option<String>> {
    let line = String::from_utf8_lossy(line);
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let response: GenerateResponse = serde_json::from_str(data)?;
    if let Some(error) = response.error {
        return Err(QurmaError::TransportError(format!("Stream error: {}", error)));
    }

    let text = response.text();
    Ok((!text.is_empty()).then_some(text))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(QurmaError::TransportError(format!("HTTP {}: {}", status, body)))
}

fn transport(e: reqwest::Error) -> QurmaError {
    QurmaError::TransportError(e.to_string())
}

pub struct GeminiGateway {
    client: Client,
    config: GatewayConfig,
    api_key: String,
}

impl GeminiGateway {
    /// Build the gateway. Fails when no credential is configured.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let api_key = config
            .credential()
            .ok_or_else(|| {
                QurmaError::ConfigError(
                    "API key is missing. Set GEMINI_API_KEY or api_key in config.toml".into(),
                )
            })?
            .to_string();

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(transport)?;

        info!("Gemini gateway ready (chat model: {})", config.chat_model);

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.config.base_url, model, method)
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self
            .client
            .post(self.endpoint(model, "generateContent"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let response: GenerateResponse = check_status(response).await?.json().await.map_err(transport)?;
        if let Some(error) = response.error {
            return Err(QurmaError::TransportError(error.to_string()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Gateway for GeminiGateway {
    fn start_chat(&self, options: &ChatOptions, history: &[Message]) -> Result<Box<dyn ChatHandle>> {
        let tools = if options.use_search {
            vec![json!({ "googleSearch": {} })]
        } else {
            Vec::new()
        };

        let seeded = history_contents(history);
        debug!("Starting chat with {} prior turns (search: {})", seeded.len(), options.use_search);

        Ok(Box::new(GeminiChat {
            client: self.client.clone(),
            url: format!("{}?alt=sse", self.endpoint(&self.config.chat_model, "streamGenerateContent")),
            api_key: self.api_key.clone(),
            generation_config: GenerationConfig {
                temperature: Some(options.temperature),
                top_p: Some(options.top_p),
                top_k: Some(options.top_k),
                ..Default::default()
            },
            tools,
            history: Arc::new(Mutex::new(seeded)),
        }))
    }

    async fn analyze_image(&self, prompt: &str, image: &ImageAttachment) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![
                    Part::inline(image.data.clone(), image.mime_type.clone()),
                    Part::text(prompt),
                ],
            }],
            system_instruction: Some(system_content()),
            generation_config: None,
            tools: Vec::new(),
        };

        Ok(self.generate(&self.config.vision_model, &request).await?.text())
    }

    async fn transcribe_audio(&self, audio_base64: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![
                    Part::inline(audio_base64, TRANSCRIPTION_MIME),
                    Part::text(TRANSCRIPTION_PROMPT),
                ],
            }],
            system_instruction: None,
            generation_config: None,
            tools: Vec::new(),
        };

        let raw = self.generate(&self.config.transcription_model, &request).await?.text();
        Ok(clean_transcription(&raw))
    }

    async fn refine_content(&self, text: &str, action: RefineAction) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content::text(
                Some("user"),
                format!("{}\n\nTEKS:\n{}", action.prompt(), text),
            )],
            system_instruction: Some(system_content()),
            generation_config: Some(GenerationConfig {
                temperature: Some(self.config.refine_temperature),
                ..Default::default()
            }),
            tools: Vec::new(),
        };

        Ok(self.generate(&self.config.refine_model, &request).await?.text())
    }

    async fn synthesize_speech(&self, text: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content::text(None, format!("{}{}", SPEECH_PROMPT_PREFIX, text))],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".into()]),
                speech_config: Some(json!({
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": self.config.speech_voice } }
                })),
                ..Default::default()
            }),
            tools: Vec::new(),
        };

        let response = self.generate(&self.config.speech_model, &request).await?;
        response
            .inline_data()
            .map(str::to_string)
            .ok_or_else(|| QurmaError::EmptyResponse("Speech response carried no audio".into()))
    }

    async fn connect_live(&self, callbacks: Box<dyn LiveCallbacks>) -> Result<Box<dyn LiveHandle>> {
        let handle = live::connect(&self.config, &self.api_key, callbacks).await?;
        Ok(Box::new(handle))
    }
}

struct GeminiChat {
    client: Client,
    url: String,
    api_key: String,
    generation_config: GenerationConfig,
    tools: Vec<Value>,
    /// Completed exchanges; a failed send leaves it untouched
    history: Arc<Mutex<Vec<Content>>>,
}

#[async_trait]
impl ChatHandle for GeminiChat {
    async fn send_stream(&mut self, text: &str) -> Result<TextStream> {
        let user = Content::text(Some("user"), text);
        let mut contents = self.history.lock().clone();
        contents.push(user.clone());

        let request = GenerateRequest {
            contents,
            system_instruction: Some(system_content()),
            generation_config: Some(self.generation_config.clone()),
            tools: self.tools.clone(),
        };

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;

        let history = Arc::clone(&self.history);
        let stream = stream! {
            let mut body = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut reply = String::new();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(transport(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&line) {
                        Ok(Some(delta)) => {
                            reply.push_str(&delta);
                            yield Ok::<String, QurmaError>(delta);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            match parse_sse_line(&buffer) {
                Ok(Some(delta)) => {
                    reply.push_str(&delta);
                    yield Ok(delta);
                }
                Ok(None) => {}
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            history.lock().extend([user, Content::text(Some("model"), reply)]);
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_is_config_error() {
        let result = GeminiGateway::new(GatewayConfig::default());
        assert!(matches!(result, Err(QurmaError::ConfigError(_))));
    }

    #[test]
    fn test_parse_sse_delta() {
        let line = br#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"Wa'alaikum"},{"text":"salam"}]}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().as_deref(), Some("Wa'alaikumsalam"));
    }

    #[test]
    fn test_parse_sse_ignores_other_lines() {
        assert_eq!(parse_sse_line(b"\r\n").unwrap(), None);
        assert_eq!(parse_sse_line(b"event: message").unwrap(), None);
        assert_eq!(
            parse_sse_line(br#"data: {"candidates":[{"content":{"parts":[]}}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_sse_error_payload() {
        let line = br#"data: {"error":{"code":503,"message":"overloaded"}}"#;
        assert!(matches!(parse_sse_line(line), Err(QurmaError::TransportError(_))));
    }

    #[test]
    fn test_history_skips_unfinished_turns() {
        let mut failed = Message::pending_assistant();
        failed.text = "Sebagian jawab".into();
        failed.state = TurnState::Failed;

        let messages = vec![
            Message::user("Apa itu wudhu?"),
            Message::assistant("Wudhu adalah bersuci."),
            failed,
            Message::pending_assistant(),
        ];

        let contents = history_contents(&messages);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part::inline("AAAA", "image/png"), Part::text("Jelaskan")],
            }],
            system_instruction: Some(system_content()),
            generation_config: Some(GenerationConfig {
                temperature: Some(0.5),
                ..Default::default()
            }),
            tools: Vec::new(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(value["generationConfig"]["temperature"], 0.5);
        assert!(value.get("tools").is_none());
        assert!(value["systemInstruction"].get("role").is_none());
    }
}
