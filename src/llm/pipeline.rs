//! Chat pipeline: turns user submissions into assistant messages
//!
//! Plain text is streamed into a growing assistant message; image analysis
//! and refinement arrive as one finished message. Every request ends in a
//! terminal message, and progress is published on an event channel.

use crate::llm::config::ChatOptions;
use crate::llm::gateway::{ChatHandle, Gateway, ImageAttachment, RefineAction};
use crate::llm::prompts::{
    CONNECTION_ERROR_TEXT, DEFAULT_IMAGE_PROMPT, EMPTY_RESULT_TEXT, IMAGE_UPLOAD_TEXT,
};
use crate::messages::{Message, MessageId, SessionId, TurnState};
use crate::session::SharedStore;
use crate::{QurmaError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::StreamExt;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A user submission
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl SendRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

/// Why a submission was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Neither text nor image
    Empty,
    /// Another send is still in flight
    Busy,
    /// Voice input is still being turned into text for the draft
    Transcribing,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Empty => write!(f, "Tulis pertanyaan atau lampirkan gambar terlebih dahulu."),
            RejectReason::Busy => write!(f, "Mohon tunggu, jawaban sebelumnya belum selesai."),
            RejectReason::Transcribing => write!(f, "Mohon tunggu, suara Anda sedang diproses."),
        }
    }
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Rejected(RejectReason),
    Completed {
        session_id: SessionId,
        reply_id: MessageId,
    },
    /// The request failed; `error_id` is the fallback message appended for it
    Failed {
        session_id: SessionId,
        error_id: MessageId,
        error: QurmaError,
    },
}

/// Events emitted by the chat pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// An assistant turn has been opened
    Started {
        session_id: SessionId,
        message_id: MessageId,
    },

    /// Text was appended to a streaming turn
    Delta { message_id: MessageId, text: String },

    /// A turn reached its final text
    Completed {
        message_id: MessageId,
        /// Total time in milliseconds
        total_ms: u64,
    },

    /// A request failed and a fallback message was appended
    Failed {
        message_id: MessageId,
        error: String,
    },
}

/// Clears the busy flag on every exit path
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Remote chat bound to the session and options it was opened for
struct ActiveChat {
    session_id: SessionId,
    options: ChatOptions,
    handle: Box<dyn ChatHandle>,
}

pub struct ChatPipeline {
    gateway: Arc<dyn Gateway>,
    store: SharedStore,
    options: RwLock<ChatOptions>,
    chat: tokio::sync::Mutex<Option<ActiveChat>>,
    busy: AtomicBool,
    timeout: Duration,
    event_tx: Sender<TurnEvent>,
    event_rx: Receiver<TurnEvent>,
}

impl ChatPipeline {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: SharedStore,
        options: ChatOptions,
        timeout: Duration,
    ) -> Self {
        let (event_tx, event_rx) = unbounded();

        Self {
            gateway,
            store,
            options: RwLock::new(options),
            chat: tokio::sync::Mutex::new(None),
            busy: AtomicBool::new(false),
            timeout,
            event_tx,
            event_rx,
        }
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<TurnEvent> {
        self.event_rx.clone()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn options(&self) -> ChatOptions {
        self.options.read().clone()
    }

    /// Toggle search grounding; the next send opens a fresh remote chat
    pub fn set_search(&self, use_search: bool) {
        self.options.write().use_search = use_search;
        info!("Search grounding {}", if use_search { "enabled" } else { "disabled" });
    }

    /// Submit text and/or an image.
    ///
    /// Rejected without side effects when empty or while another send is in
    /// flight. Otherwise the user turn is recorded (creating a session if none
    /// is active) and the request always ends in a terminal assistant message.
    pub async fn send(&self, request: SendRequest) -> SendOutcome {
        let text = request.text.trim().to_string();
        if text.is_empty() && request.image.is_none() {
            return SendOutcome::Rejected(RejectReason::Empty);
        }

        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("Send rejected: a request is already in flight");
            return SendOutcome::Rejected(RejectReason::Busy);
        };

        let (user_text, title_seed) = if text.is_empty() {
            (IMAGE_UPLOAD_TEXT.to_string(), None)
        } else {
            (text.clone(), Some(text.clone()))
        };
        let session_id = self
            .store
            .lock()
            .append_message_seeded(Message::user(user_text), title_seed.as_deref());

        match request.image {
            Some(image) => {
                let prompt = if text.is_empty() { DEFAULT_IMAGE_PROMPT } else { text.as_str() };
                self.complete_atomic(session_id, self.gateway.analyze_image(prompt, &image))
                    .await
            }
            None => self.stream_reply(session_id, &text).await,
        }
    }

    /// Rework an existing message and append the result as a new assistant turn
    pub async fn refine(&self, message_id: &MessageId, action: RefineAction) -> Result<SendOutcome> {
        let (session_id, source) = {
            let store = self.store.lock();
            let session_id = store
                .active_id()
                .ok_or_else(|| QurmaError::NotFound("No active session".into()))?;
            let message = store
                .message(message_id)
                .ok_or_else(|| QurmaError::NotFound(format!("Message {}", message_id)))?;
            (session_id, message.text.clone())
        };

        info!("Refining message {} ({})", message_id, action.as_str());
        Ok(self
            .complete_atomic(session_id, self.gateway.refine_content(&source, action))
            .await)
    }

    async fn complete_atomic<F>(&self, session_id: SessionId, call: F) -> SendOutcome
    where
        F: Future<Output = Result<String>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) if text.trim().is_empty() => {
                Err(QurmaError::EmptyResponse("Remote returned no text".into()))
            }
            Ok(result) => result,
            Err(_) => Err(QurmaError::Timeout(format!(
                "No reply within {}s",
                self.timeout.as_secs()
            ))),
        };

        match result {
            Ok(text) => {
                let reply = Message::assistant(text);
                let reply_id = reply.id;
                self.append_to(session_id, reply);
                self.emit(TurnEvent::Completed {
                    message_id: reply_id,
                    total_ms: start.elapsed().as_millis() as u64,
                });
                SendOutcome::Completed {
                    session_id,
                    reply_id,
                }
            }
            Err(e) => self.fail(session_id, e),
        }
    }

    async fn stream_reply(&self, session_id: SessionId, text: &str) -> SendOutcome {
        let start = Instant::now();
        let placeholder = Message::pending_assistant();
        let reply_id = placeholder.id;
        self.append_to(session_id, placeholder);
        self.emit(TurnEvent::Started {
            session_id,
            message_id: reply_id,
        });

        match self.pump_stream(session_id, text, &reply_id).await {
            Ok(chars) => {
                // Every delta landed, so the reply is whole even if its session
                // has since been left
                self.store
                    .lock()
                    .finish_message_in(&session_id, &reply_id, TurnState::Complete);
                let total_ms = start.elapsed().as_millis() as u64;
                debug!("Stream complete: {} chars in {}ms", chars, total_ms);
                self.emit(TurnEvent::Completed {
                    message_id: reply_id,
                    total_ms,
                });
                SendOutcome::Completed {
                    session_id,
                    reply_id,
                }
            }
            Err(e) => {
                // The partial reply stays visible but closed; the error is a separate turn
                self.store
                    .lock()
                    .finish_message_in(&session_id, &reply_id, TurnState::Failed);
                self.fail(session_id, e)
            }
        }
    }

    /// Feed deltas into the placeholder; returns the number of characters received
    async fn pump_stream(&self, session_id: SessionId, text: &str, reply_id: &MessageId) -> Result<usize> {
        let mut chat = self.chat.lock().await;
        let options = self.options();

        let stale = chat
            .as_ref()
            .map_or(true, |c| c.session_id != session_id || c.options != options);
        if stale {
            let history: Vec<Message> = {
                let store = self.store.lock();
                let messages = store.session(&session_id).map(|s| s.messages.as_slice()).unwrap_or(&[]);
                // Everything before the user turn and placeholder just appended
                messages[..messages.len().saturating_sub(2)].to_vec()
            };
            let handle = self.gateway.start_chat(&options, &history)?;
            *chat = Some(ActiveChat {
                session_id,
                options,
                handle,
            });
        }

        let Some(active) = chat.as_mut() else {
            return Err(QurmaError::ChannelError("Chat handle missing".into()));
        };

        let mut stream = match tokio::time::timeout(self.timeout, active.handle.send_stream(text)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(self.timeout_error()),
        };

        let mut received = 0;
        loop {
            let next = match tokio::time::timeout(self.timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => return Err(self.timeout_error()),
            };
            let Some(delta) = next else { break };
            let delta = delta?;

            received += delta.chars().count();
            if !self.store.lock().extend_message(reply_id, &delta) {
                // Deltas only land in the selected session; once one is lost the
                // reply can never be completed
                warn!("Reply {} left the active session; abandoning stream", reply_id);
                return Err(QurmaError::Interrupted(format!(
                    "Session {} was left while its reply streamed",
                    session_id
                )));
            }
            self.emit(TurnEvent::Delta {
                message_id: *reply_id,
                text: delta,
            });
        }

        Ok(received)
    }

    fn fail(&self, session_id: SessionId, error: QurmaError) -> SendOutcome {
        error!("Chat request failed: {}", error);

        let fallback = match error {
            QurmaError::EmptyResponse(_) => EMPTY_RESULT_TEXT,
            _ => CONNECTION_ERROR_TEXT,
        };
        let message = Message::assistant(fallback);
        let error_id = message.id;
        self.append_to(session_id, message);

        self.emit(TurnEvent::Failed {
            message_id: error_id,
            error: error.to_string(),
        });
        SendOutcome::Failed {
            session_id,
            error_id,
            error,
        }
    }

    /// Append to the session the request belongs to, if it is still selected
    fn append_to(&self, session_id: SessionId, message: Message) {
        let mut store = self.store.lock();
        if store.active_id() == Some(session_id) {
            store.append_message(message);
        } else {
            warn!(
                "Session {} is no longer active; dropping message {}",
                session_id, message.id
            );
        }
    }

    fn timeout_error(&self) -> QurmaError {
        QurmaError::Timeout(format!("No reply within {}s", self.timeout.as_secs()))
    }

    fn emit(&self, event: TurnEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = BusyGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(BusyGuard::acquire(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_send_request_builder() {
        let request = SendRequest::text("Jelaskan gambar ini")
            .with_image(ImageAttachment::from_bytes(b"img", "image/png"));
        assert_eq!(request.text, "Jelaskan gambar ini");
        assert_eq!(request.image.unwrap().mime_type, "image/png");
    }
}
