//! Live duplex voice session over a WebSocket
//!
//! Microphone PCM goes up as realtime input; spoken replies come back as PCM
//! chunks delivered to [`LiveCallbacks`].

use crate::llm::config::GatewayConfig;
use crate::llm::prompts::{LIVE_INSTRUCTION_SUFFIX, SYSTEM_INSTRUCTION};
use crate::{QurmaError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Decoded server message
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    SetupComplete,
    /// 16-bit little-endian PCM
    Audio { data: Vec<u8>, mime_type: String },
    Text(String),
    Interrupted,
    TurnComplete,
}

/// Event sink for a live session
pub trait LiveCallbacks: Send + 'static {
    fn on_open(&mut self);

    fn on_message(&mut self, message: LiveMessage);

    fn on_error(&mut self, error: QurmaError);

    fn on_close(&mut self, reason: Option<String>);
}

/// Client side of an open live session
pub trait LiveHandle: Send + Sync {
    /// Stream microphone samples to the model
    fn send_audio(&self, pcm: &[i16], sample_rate: u32) -> Result<()>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

pub struct GeminiLiveHandle {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    cancel: CancellationToken,
}

impl LiveHandle for GeminiLiveHandle {
    fn send_audio(&self, pcm: &[i16], sample_rate: u32) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(QurmaError::ChannelError("Live session is closed".into()));
        }
        let frame = realtime_audio_frame(pcm, sample_rate);
        self.outgoing
            .send(WsMessage::text(frame.to_string()))
            .map_err(|_| QurmaError::ChannelError("Live session writer has stopped".into()))
    }

    fn close(&self) {
        self.cancel.cancel();
    }

    fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for GeminiLiveHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Open a live session and start pumping server messages into `callbacks`
pub async fn connect(
    config: &GatewayConfig,
    api_key: &str,
    mut callbacks: Box<dyn LiveCallbacks>,
) -> Result<GeminiLiveHandle> {
    let url = format!("{}?key={}", config.live_url, api_key);
    let (socket, _) = connect_async(url)
        .await
        .map_err(|e| QurmaError::TransportError(format!("Live connect failed: {}", e)))?;
    let (mut writer, mut reader) = socket.split();

    writer
        .send(WsMessage::text(setup_frame(config).to_string()))
        .await
        .map_err(|e| QurmaError::TransportError(format!("Live setup failed: {}", e)))?;

    info!("Live session opened with model {}", config.live_model);
    callbacks.on_open();

    let cancel = CancellationToken::new();
    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<WsMessage>();

    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => {
                    let _ = writer.send(WsMessage::Close(None)).await;
                    break;
                }
                frame = outgoing_rx.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = writer.send(frame).await {
                            warn!("Live writer failed: {}", e);
                            writer_cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("Live writer stopped");
    });

    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut reason = None;
        loop {
            let frame = tokio::select! {
                _ = reader_cancel.cancelled() => break,
                frame = reader.next() => frame,
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => dispatch(text.as_str(), callbacks.as_mut()),
                Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => dispatch(text, callbacks.as_mut()),
                    Err(_) => warn!("Ignoring non-UTF-8 live frame of {} bytes", bytes.len()),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    reason = frame.map(|f| f.reason.to_string());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    callbacks.on_error(QurmaError::TransportError(e.to_string()));
                    break;
                }
                None => break,
            }
        }

        reader_cancel.cancel();
        info!("Live session closed");
        callbacks.on_close(reason);
    });

    Ok(GeminiLiveHandle { outgoing, cancel })
}

fn dispatch(text: &str, callbacks: &mut dyn LiveCallbacks) {
    match parse_server_message(text) {
        Ok(messages) => {
            for message in messages {
                callbacks.on_message(message);
            }
        }
        Err(e) => callbacks.on_error(e),
    }
}

fn setup_frame(config: &GatewayConfig) -> Value {
    json!({
        "setup": {
            "model": format!("models/{}", config.live_model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": config.live_voice } }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": format!("{}{}", SYSTEM_INSTRUCTION, LIVE_INSTRUCTION_SUFFIX) }]
            }
        }
    })
}

fn realtime_audio_frame(pcm: &[i16], sample_rate: u32) -> Value {
    let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
    json!({
        "realtimeInput": {
            "audio": {
                "data": STANDARD.encode(bytes),
                "mimeType": format!("audio/pcm;rate={}", sample_rate)
            }
        }
    })
}

/// Decode one server frame into zero or more messages
pub fn parse_server_message(text: &str) -> Result<Vec<LiveMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let mut messages = Vec::new();

    if value.get("setupComplete").is_some() {
        messages.push(LiveMessage::SetupComplete);
    }

    if let Some(content) = value.get("serverContent") {
        let parts = content
            .pointer("/modelTurn/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for part in parts {
            if let Some(inline) = part.get("inlineData") {
                let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
                let mime_type = inline
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .unwrap_or("audio/pcm;rate=24000");
                match STANDARD.decode(data) {
                    Ok(data) => messages.push(LiveMessage::Audio {
                        data,
                        mime_type: mime_type.to_string(),
                    }),
                    Err(e) => warn!("Dropping undecodable live audio: {}", e),
                }
            } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                messages.push(LiveMessage::Text(text.to_string()));
            }
        }

        if content.get("interrupted").and_then(Value::as_bool) == Some(true) {
            messages.push(LiveMessage::Interrupted);
        }
        if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
            messages.push(LiveMessage::TurnComplete);
        }
    }

    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setup_complete() {
        let messages = parse_server_message(r#"{"setupComplete": {}}"#).unwrap();
        assert_eq!(messages, vec![LiveMessage::SetupComplete]);
    }

    #[test]
    fn test_parse_audio_and_turn_complete() {
        let frame = r#"{
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAEA/w==" } }
                ]},
                "turnComplete": true
            }
        }"#;

        let messages = parse_server_message(frame).unwrap();
        assert_eq!(
            messages,
            vec![
                LiveMessage::Audio {
                    data: vec![0x00, 0x01, 0x00, 0xff],
                    mime_type: "audio/pcm;rate=24000".to_string()
                },
                LiveMessage::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_parse_interrupted() {
        let messages =
            parse_server_message(r#"{"serverContent": {"interrupted": true}}"#).unwrap();
        assert_eq!(messages, vec![LiveMessage::Interrupted]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_server_message("not json").is_err());
    }

    #[test]
    fn test_audio_frame_encodes_little_endian() {
        let frame = realtime_audio_frame(&[1, -1], 16000);
        assert_eq!(frame["realtimeInput"]["audio"]["data"], "AQD//w==");
        assert_eq!(frame["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn test_setup_uses_live_voice() {
        let frame = setup_frame(&GatewayConfig::default());
        assert_eq!(
            frame["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
    }
}
