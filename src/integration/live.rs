//! Live voice conversation
//!
//! Streams microphone PCM into a live session and plays the spoken replies
//! as they arrive. An interruption from the server flushes queued audio.

use crate::audio::input::AudioCapture;
use crate::audio::output::AudioSink;
use crate::audio::wav::{decode_pcm16_le, to_pcm16};
use crate::audio::SPEECH_SAMPLE_RATE;
use crate::llm::gateway::Gateway;
use crate::llm::live::{LiveCallbacks, LiveHandle, LiveMessage};
use crate::{QurmaError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Opened,
    /// Text part of a reply, if the model sends any
    Text(String),
    Interrupted,
    TurnComplete,
    Error(String),
    Closed(Option<String>),
}

struct Bridge {
    sink: Arc<dyn AudioSink>,
    event_tx: Sender<LiveEvent>,
}

impl Bridge {
    fn emit(&self, event: LiveEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl LiveCallbacks for Bridge {
    fn on_open(&mut self) {
        self.emit(LiveEvent::Opened);
    }

    fn on_message(&mut self, message: LiveMessage) {
        match message {
            LiveMessage::SetupComplete => debug!("Live setup complete"),
            LiveMessage::Audio { data, mime_type } => {
                let rate = pcm_rate(&mime_type).unwrap_or(SPEECH_SAMPLE_RATE);
                if let Err(e) = self.sink.enqueue(decode_pcm16_le(&data), rate) {
                    warn!("Dropping live audio: {}", e);
                }
            }
            LiveMessage::Text(text) => self.emit(LiveEvent::Text(text)),
            LiveMessage::Interrupted => {
                self.sink.clear();
                self.emit(LiveEvent::Interrupted);
            }
            LiveMessage::TurnComplete => self.emit(LiveEvent::TurnComplete),
        }
    }

    fn on_error(&mut self, error: QurmaError) {
        warn!("Live session error: {}", error);
        self.emit(LiveEvent::Error(error.user_message()));
    }

    fn on_close(&mut self, reason: Option<String>) {
        self.emit(LiveEvent::Closed(reason));
    }
}

/// Parse the rate out of a mime type such as `audio/pcm;rate=24000`
fn pcm_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
}

pub struct LiveConversation {
    handle: Arc<dyn LiveHandle>,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
    event_rx: Receiver<LiveEvent>,
}

impl LiveConversation {
    /// Connect, open the microphone and start streaming
    pub async fn start(
        gateway: &dyn Gateway,
        capture: &dyn AudioCapture,
        sink: Arc<dyn AudioSink>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = unbounded();
        let handle: Arc<dyn LiveHandle> = gateway
            .connect_live(Box::new(Bridge { sink, event_tx }))
            .await?
            .into();

        let mut stream = match capture.open() {
            Ok(stream) => stream,
            Err(e) => {
                handle.close();
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let pump_cancel = cancel.clone();
        let pump_handle = Arc::clone(&handle);
        let pump = tokio::spawn(async move {
            let rate = stream.sample_rate();
            let mut frames = 0usize;
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    frame = stream.next_frame() => match frame {
                        Some(frame) => {
                            if let Err(e) = pump_handle.send_audio(&to_pcm16(&frame), rate) {
                                warn!("Stopping live microphone: {}", e);
                                break;
                            }
                            frames += 1;
                        }
                        None => break,
                    },
                }
            }
            pump_handle.close();
            debug!("Live microphone pump sent {} frames", frames);
        });

        info!("Live conversation started");
        Ok(Self {
            handle,
            cancel,
            pump: Some(pump),
            event_rx,
        })
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<LiveEvent> {
        self.event_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Close the session and release the microphone
    pub async fn stop(mut self) {
        self.cancel.cancel();
        self.handle.close();
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                warn!("Live microphone pump failed: {}", e);
            }
        }
        info!("Live conversation stopped");
    }
}

impl Drop for LiveConversation {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.close();
    }
}
