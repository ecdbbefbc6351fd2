//! Read-aloud of assistant answers
//!
//! Text goes to the remote speech model; the reply is base64 of raw 24 kHz
//! mono 16-bit PCM, decoded here and handed to an [`AudioSink`].

use crate::audio::output::AudioSink;
use crate::audio::wav::decode_pcm16_le;
use crate::audio::SPEECH_SAMPLE_RATE;
use crate::llm::gateway::Gateway;
use crate::{QurmaError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of a read-aloud request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Played,
    /// Another answer is still being read
    AlreadyPlaying,
    /// Nothing left to read after cleaning
    NothingToSay,
}

pub struct SpeechSynthesizer {
    gateway: Arc<dyn Gateway>,
    sink: Arc<dyn AudioSink>,
    playing: AtomicBool,
    timeout: Duration,
}

struct PlayingGuard<'a>(&'a AtomicBool);

impl Drop for PlayingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SpeechSynthesizer {
    pub fn new(gateway: Arc<dyn Gateway>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            gateway,
            sink,
            playing: AtomicBool::new(false),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Synthesize and play `text`, returning once playback has finished
    pub async fn speak_text(&self, text: &str) -> Result<SpeakOutcome> {
        if self
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Speech request ignored, already playing");
            return Ok(SpeakOutcome::AlreadyPlaying);
        }
        let _playing = PlayingGuard(&self.playing);

        let cleaned = clean_for_speech(text);
        if cleaned.is_empty() {
            return Ok(SpeakOutcome::NothingToSay);
        }

        let audio = tokio::time::timeout(self.timeout, self.gateway.synthesize_speech(&cleaned))
            .await
            .map_err(|_| QurmaError::Timeout("Speech synthesis did not finish".into()))??;
        if audio.trim().is_empty() {
            return Err(QurmaError::EmptyResponse("No audio returned".into()));
        }

        let bytes = STANDARD
            .decode(audio.trim())
            .map_err(|e| QurmaError::AudioProcessingError(format!("Invalid speech audio: {}", e)))?;
        let samples = decode_pcm16_le(&bytes);
        info!(
            "Playing {:.1}s of synthesized speech",
            samples.len() as f32 / SPEECH_SAMPLE_RATE as f32
        );

        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.play_blocking(&samples, SPEECH_SAMPLE_RATE))
            .await
            .map_err(|e| QurmaError::ChannelError(format!("Playback task failed: {}", e)))??;

        Ok(SpeakOutcome::Played)
    }
}

/// Drop markdown that should not be read out: bold markers and quote prefixes
pub fn clean_for_speech(text: &str) -> String {
    text.replace("**", "").replace("> ", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::CollectingSink;
    use crate::llm::mock::{MockCall, MockGateway};

    fn synthesizer(gateway: &MockGateway, sink: &CollectingSink) -> SpeechSynthesizer {
        SpeechSynthesizer::new(Arc::new(gateway.clone()), Arc::new(sink.clone()))
    }

    #[test]
    fn test_clean_for_speech() {
        assert_eq!(
            clean_for_speech("**Niat Wudhu**\n> Dan Dia memberi rizki"),
            "Niat Wudhu\nDan Dia memberi rizki"
        );
    }

    #[tokio::test]
    async fn test_speak_decodes_pcm() {
        let gateway = MockGateway::new();
        // Two samples: 0x4000 (0.5) and 0xc000 (-0.5)
        gateway.push_reply(Ok(STANDARD.encode([0x00u8, 0x40, 0x00, 0xc0])));
        let sink = CollectingSink::new();

        let outcome = synthesizer(&gateway, &sink).speak_text("**Bismillah**").await.unwrap();
        assert_eq!(outcome, SpeakOutcome::Played);
        assert_eq!(sink.played(), vec![(vec![0.5, -0.5], 24000)]);
        assert_eq!(gateway.calls(), vec![MockCall::Speech("Bismillah".into())]);
    }

    #[tokio::test]
    async fn test_empty_audio_is_an_error() {
        let gateway = MockGateway::new();
        gateway.push_reply(Ok(String::new()));
        let sink = CollectingSink::new();
        let tts = synthesizer(&gateway, &sink);

        let result = tts.speak_text("Alhamdulillah").await;
        assert!(matches!(result, Err(QurmaError::EmptyResponse(_))));
        assert!(!tts.is_playing());
        assert!(sink.played().is_empty());
    }

    #[tokio::test]
    async fn test_second_request_ignored_while_playing() {
        let gateway = MockGateway::new();
        let sink = CollectingSink::new();
        let tts = synthesizer(&gateway, &sink);

        tts.playing.store(true, Ordering::Release);
        let outcome = tts.speak_text("Subhanallah").await.unwrap();
        assert_eq!(outcome, SpeakOutcome::AlreadyPlaying);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_is_not_sent() {
        let gateway = MockGateway::new();
        let sink = CollectingSink::new();
        let outcome = synthesizer(&gateway, &sink).speak_text("** **").await.unwrap();
        assert_eq!(outcome, SpeakOutcome::NothingToSay);
        assert!(gateway.calls().is_empty());
    }
}
