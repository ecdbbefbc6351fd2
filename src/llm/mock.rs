//! Scripted gateway for tests and offline runs

use crate::llm::config::ChatOptions;
use crate::llm::gateway::{ChatHandle, Gateway, ImageAttachment, RefineAction, TextStream};
use crate::llm::live::{LiveCallbacks, LiveHandle};
use crate::messages::Message;
use crate::{QurmaError, Result};
use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One step of a scripted reply stream
#[derive(Debug, Clone)]
pub enum StreamStep {
    Delta(String),
    Wait(Duration),
    Fail(QurmaError),
    /// Never yields again
    Hang,
}

impl StreamStep {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamStep::Delta(text.into())
    }
}

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    StartChat { history_len: usize, use_search: bool },
    Send(String),
    AnalyzeImage { prompt: String, mime_type: String },
    Transcribe { audio_len: usize },
    Refine { text: String, action: RefineAction },
    Speech(String),
    Live,
}

#[derive(Default)]
struct Script {
    streams: VecDeque<Vec<StreamStep>>,
    replies: VecDeque<Result<String>>,
    calls: Vec<MockCall>,
}

/// Gateway whose answers are queued up front.
///
/// Streamed sends consume [`MockGateway::push_stream`] scripts; every atomic
/// call consumes the next [`MockGateway::push_reply`]. Running out of script
/// yields a transport error.
#[derive(Clone, Default)]
pub struct MockGateway {
    script: Arc<Mutex<Script>>,
    reply_delay: Arc<Mutex<Duration>>,
    live_audio_frames: Arc<AtomicUsize>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream(&self, steps: Vec<StreamStep>) -> &Self {
        self.script.lock().streams.push_back(steps);
        self
    }

    pub fn push_reply(&self, reply: Result<String>) -> &Self {
        self.script.lock().replies.push_back(reply);
        self
    }

    /// Hold every atomic reply back by `delay`
    pub fn set_reply_delay(&self, delay: Duration) {
        *self.reply_delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.script.lock().calls.clone()
    }

    pub fn live_audio_frames(&self) -> usize {
        self.live_audio_frames.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) {
        self.script.lock().calls.push(call);
    }

    async fn next_reply(&self) -> Result<String> {
        let delay = *self.reply_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(QurmaError::TransportError("No scripted reply".into())))
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn start_chat(&self, options: &ChatOptions, history: &[Message]) -> Result<Box<dyn ChatHandle>> {
        self.record(MockCall::StartChat {
            history_len: history.len(),
            use_search: options.use_search,
        });
        Ok(Box::new(MockChat {
            gateway: self.clone(),
        }))
    }

    async fn analyze_image(&self, prompt: &str, image: &ImageAttachment) -> Result<String> {
        self.record(MockCall::AnalyzeImage {
            prompt: prompt.to_string(),
            mime_type: image.mime_type.clone(),
        });
        self.next_reply().await
    }

    async fn transcribe_audio(&self, audio_base64: &str) -> Result<String> {
        self.record(MockCall::Transcribe {
            audio_len: audio_base64.len(),
        });
        self.next_reply().await
    }

    async fn refine_content(&self, text: &str, action: RefineAction) -> Result<String> {
        self.record(MockCall::Refine {
            text: text.to_string(),
            action,
        });
        self.next_reply().await
    }

    async fn synthesize_speech(&self, text: &str) -> Result<String> {
        self.record(MockCall::Speech(text.to_string()));
        self.next_reply().await
    }

    async fn connect_live(&self, mut callbacks: Box<dyn LiveCallbacks>) -> Result<Box<dyn LiveHandle>> {
        self.record(MockCall::Live);
        callbacks.on_open();
        Ok(Box::new(MockLive {
            callbacks: Mutex::new(Some(callbacks)),
            frames: Arc::clone(&self.live_audio_frames),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockChat {
    gateway: MockGateway,
}

#[async_trait]
impl ChatHandle for MockChat {
    async fn send_stream(&mut self, text: &str) -> Result<TextStream> {
        self.gateway.record(MockCall::Send(text.to_string()));
        let steps = self
            .gateway
            .script
            .lock()
            .streams
            .pop_front()
            .ok_or_else(|| QurmaError::TransportError("No scripted stream".into()))?;

        let stream = stream! {
            for step in steps {
                match step {
                    StreamStep::Delta(text) => {
                        yield Ok::<String, QurmaError>(text);
                    }
                    StreamStep::Wait(duration) => tokio::time::sleep(duration).await,
                    StreamStep::Fail(error) => {
                        yield Err(error);
                        return;
                    }
                    StreamStep::Hang => futures::future::pending::<()>().await,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

struct MockLive {
    callbacks: Mutex<Option<Box<dyn LiveCallbacks>>>,
    frames: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl LiveHandle for MockLive {
    fn send_audio(&self, _pcm: &[i16], _sample_rate: u32) -> Result<()> {
        if self.is_closed() {
            return Err(QurmaError::ChannelError("Live session is closed".into()));
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Some(mut callbacks) = self.callbacks.lock().take() {
                callbacks.on_close(None);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
