//! Wires the session store, chat pipeline, voice input and read-aloud together
//!
//! The front end talks to one [`Orchestrator`]; everything behind it is
//! reachable for tests through the builder.

use crate::audio::input::AudioCapture;
use crate::audio::output::AudioSink;
use crate::integration::config::AppConfig;
use crate::integration::live::LiveConversation;
use crate::llm::gateway::{Gateway, ImageAttachment, RefineAction};
use crate::llm::gemini::GeminiGateway;
use crate::llm::pipeline::{ChatPipeline, RejectReason, SendOutcome, SendRequest};
use crate::messages::{FileStore, Message, MessageId, SessionArchive, SessionId};
use crate::session::{shared, Confirm, SessionStore, SharedStore};
use crate::speech::capture::{VoicePipeline, VoiceState};
use crate::speech::tts::{SpeakOutcome, SpeechSynthesizer};
use crate::ui::composer::Composer;
use crate::{QurmaError, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    config: AppConfig,
    gateway: Arc<dyn Gateway>,
    capture: Arc<dyn AudioCapture>,
    sink: Arc<dyn AudioSink>,
    store: SharedStore,
    composer: Composer,
    pipeline: ChatPipeline,
    voice: VoicePipeline,
    speech: SpeechSynthesizer,
}

impl Orchestrator {
    /// Build against the real service and devices
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let gateway = GeminiGateway::new(config.gateway.clone())?;
        let data_dir = config.storage.resolved_data_dir();
        info!("History stored in {}", data_dir.display());
        let archive = SessionArchive::new(Arc::new(FileStore::new(data_dir)), config.storage.key.clone());

        OrchestratorBuilder::new()
            .with_config(config)
            .with_gateway(Arc::new(gateway))
            .with_archive(archive)
            .with_capture(default_capture())
            .with_sink(default_sink())
            .build()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn pipeline(&self) -> &ChatPipeline {
        &self.pipeline
    }

    pub fn voice(&self) -> &VoicePipeline {
        &self.voice
    }

    pub fn speech(&self) -> &SpeechSynthesizer {
        &self.speech
    }

    pub fn new_session(&self) -> SessionId {
        self.store.lock().create_session()
    }

    /// Select by 1-based position in the newest-first list
    pub fn open_session(&self, position: usize) -> Result<SessionId> {
        let id = self.session_at(position)?;
        self.store.lock().select_session(&id);
        Ok(id)
    }

    /// Delete by 1-based position in the newest-first list
    pub fn delete_session(&self, position: usize) -> Result<SessionId> {
        let id = self.session_at(position)?;
        self.store.lock().delete_session(&id);
        Ok(id)
    }

    pub fn clear_all(&self, guard: &impl Confirm) -> bool {
        self.store.lock().clear_all(guard)
    }

    fn session_at(&self, position: usize) -> Result<SessionId> {
        let store = self.store.lock();
        position
            .checked_sub(1)
            .and_then(|i| store.sessions().get(i))
            .map(|s| s.id)
            .ok_or_else(|| QurmaError::NotFound(format!("Session {}", position)))
    }

    /// Put an image on the draft for the next send
    pub fn attach_image(&self, path: &Path) -> Result<()> {
        let image = ImageAttachment::from_path(path)?;
        info!("Attached {} ({})", path.display(), image.mime_type);
        self.composer.attach_image(image);
        Ok(())
    }

    /// Send whatever is in the composer. The draft is only consumed when accepted.
    ///
    /// Refused while a voice clip is being transcribed, since its text is
    /// still on its way into the draft.
    pub async fn submit(&self) -> SendOutcome {
        if self.voice.state() == VoiceState::Transcribing {
            debug!("Send rejected: transcription in progress");
            return SendOutcome::Rejected(RejectReason::Transcribing);
        }

        let request = self.composer.take();
        let outcome = self.pipeline.send(request.clone()).await;
        if matches!(outcome, SendOutcome::Rejected(_)) {
            // Put it back so nothing typed is lost
            self.composer.set_text(request.text);
            if let Some(image) = request.image {
                self.composer.attach_image(image);
            }
        }
        outcome
    }

    pub async fn send_text(&self, text: &str) -> SendOutcome {
        self.pipeline.send(SendRequest::text(text)).await
    }

    pub fn set_search(&self, enabled: bool) {
        self.pipeline.set_search(enabled);
    }

    /// 1-based position of a message in the active session, or the latest
    /// assistant message when `position` is `None`
    pub fn assistant_message(&self, position: Option<usize>) -> Result<Message> {
        let store = self.store.lock();
        let messages = store.working_messages();
        let found = match position {
            Some(n) => n.checked_sub(1).and_then(|i| messages.get(i)),
            None => messages.iter().rev().find(|m| m.is_assistant()),
        };
        found
            .filter(|m| m.is_assistant())
            .cloned()
            .ok_or_else(|| QurmaError::NotFound("No assistant message at that position".into()))
    }

    pub async fn refine(&self, message_id: &MessageId, action: RefineAction) -> Result<SendOutcome> {
        self.pipeline.refine(message_id, action).await
    }

    /// Read a message aloud
    pub async fn speak(&self, message: &Message) -> Result<SpeakOutcome> {
        self.speech.speak_text(&message.text).await
    }

    /// Start or stop voice input; returns whether recording is now running
    pub fn toggle_voice(&self) -> bool {
        self.voice.toggle()
    }

    pub async fn start_live(&self) -> Result<LiveConversation> {
        LiveConversation::start(self.gateway.as_ref(), self.capture.as_ref(), Arc::clone(&self.sink)).await
    }
}

#[cfg(feature = "audio-io")]
fn default_capture() -> Arc<dyn AudioCapture> {
    Arc::new(crate::audio::input::CpalCapture)
}

#[cfg(not(feature = "audio-io"))]
fn default_capture() -> Arc<dyn AudioCapture> {
    Arc::new(crate::audio::input::ScriptedCapture::failing(
        QurmaError::AudioDeviceError("Built without audio support".into()),
    ))
}

#[cfg(feature = "audio-io")]
fn default_sink() -> Arc<dyn AudioSink> {
    match crate::audio::output::RodioOutput::new() {
        Ok(output) => Arc::new(output),
        Err(e) => {
            warn!("Audio output unavailable: {}", e);
            Arc::new(crate::audio::output::UnavailableSink::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "audio-io"))]
fn default_sink() -> Arc<dyn AudioSink> {
    warn!("Built without audio support; read-aloud is disabled");
    Arc::new(crate::audio::output::UnavailableSink::new("Built without audio support"))
}

/// Builder for creating an orchestrator
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: AppConfig,
    gateway: Option<Arc<dyn Gateway>>,
    archive: Option<SessionArchive>,
    capture: Option<Arc<dyn AudioCapture>>,
    sink: Option<Arc<dyn AudioSink>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_archive(mut self, archive: SessionArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn AudioCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// A gateway is required; everything else falls back to in-memory or
    /// unavailable stand-ins
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        let gateway = self
            .gateway
            .ok_or_else(|| QurmaError::ConfigError("No gateway configured".into()))?;
        let archive = self.archive.unwrap_or_else(SessionArchive::in_memory);
        let capture = self.capture.unwrap_or_else(|| {
            Arc::new(crate::audio::input::ScriptedCapture::failing(
                QurmaError::AudioDeviceError("No microphone configured".into()),
            ))
        });
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(crate::audio::output::UnavailableSink::new("No speaker configured")));

        let timeout = config.gateway.request_timeout();
        let store = shared(SessionStore::open(archive));
        let composer = Composer::new();

        let pipeline = ChatPipeline::new(Arc::clone(&gateway), Arc::clone(&store), config.chat.clone(), timeout);
        let voice = VoicePipeline::new(
            Arc::clone(&capture),
            Arc::clone(&gateway),
            composer.clone(),
            config.voice.clone(),
        )
        .with_timeout(timeout);
        let speech = SpeechSynthesizer::new(Arc::clone(&gateway), Arc::clone(&sink)).with_timeout(timeout);

        Ok(Orchestrator {
            config,
            gateway,
            capture,
            sink,
            store,
            composer,
            pipeline,
            voice,
            speech,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockGateway, StreamStep};
    use crate::messages::TurnState;

    fn orchestrator(gateway: &MockGateway) -> Orchestrator {
        OrchestratorBuilder::new()
            .with_gateway(Arc::new(gateway.clone()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_gateway() {
        assert!(matches!(
            OrchestratorBuilder::new().build(),
            Err(QurmaError::ConfigError(_))
        ));
    }

    #[test]
    fn test_from_config_requires_key() {
        assert!(matches!(
            Orchestrator::from_config(AppConfig::default()),
            Err(QurmaError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_consumes_draft() {
        let gateway = MockGateway::new();
        gateway.push_stream(vec![StreamStep::delta("Wa'alaikumsalam")]);
        let app = orchestrator(&gateway);

        app.composer().set_text("Assalamualaikum");
        let outcome = app.submit().await;
        assert!(matches!(outcome, SendOutcome::Completed { .. }));
        assert!(app.composer().is_empty());

        let reply = app.assistant_message(None).unwrap();
        assert_eq!(reply.text, "Wa'alaikumsalam");
        assert_eq!(reply.state, TurnState::Complete);
    }

    #[tokio::test]
    async fn test_empty_submit_is_rejected() {
        let app = orchestrator(&MockGateway::new());
        assert!(matches!(app.submit().await, SendOutcome::Rejected(_)));
        assert_eq!(app.store().lock().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_waits_for_transcription() {
        let gateway = MockGateway::new();
        gateway.set_reply_delay(std::time::Duration::from_secs(2));
        gateway.push_reply(Ok("tentang puasa".into()));
        gateway.push_stream(vec![StreamStep::delta("Puasa adalah menahan diri.")]);
        let capture = crate::audio::input::ScriptedCapture::new(
            16000,
            vec![vec![0.25; 160]; 500],
            std::time::Duration::from_millis(10),
        );
        let app = OrchestratorBuilder::new()
            .with_gateway(Arc::new(gateway.clone()))
            .with_capture(Arc::new(capture))
            .build()
            .unwrap();

        app.composer().set_text("Jelaskan");
        assert!(app.toggle_voice());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        app.voice().stop();
        while app.voice().state() != VoiceState::Transcribing {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        assert_eq!(
            app.submit().await,
            SendOutcome::Rejected(RejectReason::Transcribing)
        );
        assert_eq!(app.composer().text(), "Jelaskan");
        assert!(app.store().lock().is_empty());

        app.voice().wait_idle().await;
        assert_eq!(app.composer().text(), "Jelaskan tentang puasa");
        assert!(matches!(app.submit().await, SendOutcome::Completed { .. }));
    }

    #[test]
    fn test_positions_are_one_based() {
        let app = orchestrator(&MockGateway::new());
        let older = app.new_session();
        let newer = app.new_session();

        assert_eq!(app.open_session(1).unwrap(), newer);
        assert_eq!(app.open_session(2).unwrap(), older);
        assert!(matches!(app.open_session(0), Err(QurmaError::NotFound(_))));
        assert!(matches!(app.delete_session(3), Err(QurmaError::NotFound(_))));

        assert_eq!(app.delete_session(2).unwrap(), older);
        assert_eq!(app.store().lock().len(), 1);
    }

    #[test]
    fn test_assistant_message_lookup() {
        let app = orchestrator(&MockGateway::new());
        assert!(app.assistant_message(None).is_err());

        {
            let mut store = app.store().lock();
            store.append_message(Message::user("Apa itu ihsan?"));
            store.append_message(Message::assistant("Ihsan adalah ..."));
        }
        assert!(app.assistant_message(Some(1)).is_err());
        assert_eq!(app.assistant_message(Some(2)).unwrap().text, "Ihsan adalah ...");
        assert_eq!(app.assistant_message(None).unwrap().text, "Ihsan adalah ...");
    }

    #[tokio::test]
    async fn test_voice_without_microphone_reports_error() {
        let app = orchestrator(&MockGateway::new());
        let events = app.voice().event_receiver();
        assert!(!app.toggle_voice());
        assert!(matches!(
            events.try_recv(),
            Ok(crate::speech::capture::VoiceEvent::Error(_))
        ));
    }
}
