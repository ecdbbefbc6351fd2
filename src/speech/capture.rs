//! Voice capture pipeline
//!
//! Records from an [`AudioCapture`] until stopped by hand or by sustained
//! silence, transcribes the clip and appends the text to the [`Composer`].
//! Voice input is best effort: every failure is logged, reported as a
//! [`VoiceEvent::Error`] and the pipeline returns to idle.

use crate::audio::analyser::{SpectrumAnalyser, DEFAULT_FFT_SIZE};
use crate::audio::input::{AudioCapture, CaptureStream};
use crate::audio::wav::encode_wav;
use crate::llm::gateway::Gateway;
use crate::speech::silence::{SilenceDetector, DEFAULT_SILENCE_HOLD, DEFAULT_SILENCE_THRESHOLD};
use crate::ui::composer::Composer;
use crate::{QurmaError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Voice capture settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Mean spectrum level (0-255) below which input counts as silence
    pub silence_threshold: f32,

    /// How long silence must last before recording stops on its own
    pub silence_hold_ms: u64,

    /// Analysis window in samples
    pub fft_size: usize,

    /// Interval between level checks
    pub tick_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            silence_hold_ms: DEFAULT_SILENCE_HOLD.as_millis() as u64,
            fft_size: DEFAULT_FFT_SIZE,
            tick_ms: 16,
        }
    }
}

impl VoiceConfig {
    pub fn with_silence_threshold(mut self, threshold: f32) -> Self {
        self.silence_threshold = threshold;
        self
    }

    pub fn with_silence_hold(mut self, hold: Duration) -> Self {
        self.silence_hold_ms = hold.as_millis() as u64;
        self
    }

    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }

    pub fn silence_hold(&self) -> Duration {
        Duration::from_millis(self.silence_hold_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(QurmaError::ConfigError(format!(
                "fft_size must be a non-zero power of two, got {}",
                self.fft_size
            )));
        }
        if !(0.0..=255.0).contains(&self.silence_threshold) {
            return Err(QurmaError::ConfigError(
                "silence_threshold must be within 0-255".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Recording,
    Transcribing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Started,
    /// Recording ended after sustained silence
    AutoStopped,
    Stopped,
    /// Transcript appended to the composer
    Transcribed(String),
    /// User-facing failure message; the pipeline is idle again
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Manual,
    Silence,
    DeviceLost,
}

/// Everything the recorder task needs, cloned out of the pipeline
#[derive(Clone)]
struct Recorder {
    gateway: Arc<dyn Gateway>,
    composer: Composer,
    config: VoiceConfig,
    timeout: Duration,
    state: Arc<RwLock<VoiceState>>,
    event_tx: Sender<VoiceEvent>,
}

pub struct VoicePipeline {
    capture: Arc<dyn AudioCapture>,
    recorder: Recorder,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
    event_rx: Receiver<VoiceEvent>,
}

impl VoicePipeline {
    pub fn new(
        capture: Arc<dyn AudioCapture>,
        gateway: Arc<dyn Gateway>,
        composer: Composer,
        config: VoiceConfig,
    ) -> Self {
        let (event_tx, event_rx) = unbounded();

        Self {
            capture,
            recorder: Recorder {
                gateway,
                composer,
                config,
                timeout: Duration::from_secs(60),
                state: Arc::new(RwLock::new(VoiceState::Idle)),
                event_tx,
            },
            cancel: Mutex::new(None),
            task: Mutex::new(None),
            event_rx,
        }
    }

    /// Deadline for the transcription call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.recorder.timeout = timeout;
        self
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<VoiceEvent> {
        self.event_rx.clone()
    }

    pub fn state(&self) -> VoiceState {
        *self.recorder.state.read()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == VoiceState::Recording
    }

    /// Begin recording. Must be called within a tokio runtime.
    ///
    /// Returns `false` if already busy or if the microphone could not be
    /// opened; the latter is reported as an error event.
    pub fn start(&self) -> bool {
        {
            let mut state = self.recorder.state.write();
            if *state != VoiceState::Idle {
                debug!("Voice start ignored in state {:?}", *state);
                return false;
            }
            *state = VoiceState::Recording;
        }

        let opened = SpectrumAnalyser::new(self.recorder.config.fft_size)
            .and_then(|analyser| Ok((analyser, self.capture.open()?)));
        let (analyser, stream) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.recorder.set_state(VoiceState::Idle);
                self.recorder.emit(VoiceEvent::Error(e.user_message()));
                return false;
            }
        };

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        info!("Recording started at {} Hz", stream.sample_rate());
        self.recorder.emit(VoiceEvent::Started);

        let recorder = self.recorder.clone();
        let handle = tokio::spawn(async move {
            recorder.run(stream, analyser, cancel).await;
        });
        *self.task.lock() = Some(handle);
        true
    }

    /// Stop recording and transcribe what was captured. No-op unless recording.
    pub fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
    }

    /// Start when idle, stop when recording. Returns whether a recording is now running.
    pub fn toggle(&self) -> bool {
        match self.state() {
            VoiceState::Idle => self.start(),
            VoiceState::Recording => {
                self.stop();
                false
            }
            VoiceState::Transcribing => false,
        }
    }

    /// Wait for the current recording, including its transcription, to finish
    pub async fn wait_idle(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Recorder task failed: {}", e);
                self.recorder.set_state(VoiceState::Idle);
            }
        }
    }
}

impl Drop for VoicePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Recorder {
    async fn run(self, mut stream: CaptureStream, mut analyser: SpectrumAnalyser, cancel: CancellationToken) {
        let mut detector =
            SilenceDetector::new(self.config.silence_threshold, self.config.silence_hold());
        let mut tick = tokio::time::interval(self.config.tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clip: Vec<f32> = Vec::new();

        let reason = loop {
            let deadline = detector.deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Manual,
                frame = stream.next_frame() => match frame {
                    Some(frame) => {
                        analyser.push(&frame);
                        clip.extend_from_slice(&frame);
                    }
                    None => break StopReason::DeviceLost,
                },
                _ = until(deadline) => {
                    if detector.poll(Instant::now()) {
                        break StopReason::Silence;
                    }
                }
                _ = tick.tick() => {
                    if detector.observe(analyser.mean_level(), Instant::now()) {
                        break StopReason::Silence;
                    }
                }
            }
        };

        let sample_rate = stream.sample_rate();
        drop(stream);

        match reason {
            StopReason::Silence => {
                info!("Silence detected, stopping recording");
                self.emit(VoiceEvent::AutoStopped);
            }
            StopReason::Manual => {
                info!("Recording stopped");
                self.emit(VoiceEvent::Stopped);
            }
            StopReason::DeviceLost => {
                warn!("Microphone stream ended unexpectedly");
                self.emit(VoiceEvent::Stopped);
            }
        }

        self.set_state(VoiceState::Transcribing);
        match self.transcribe(&clip, sample_rate).await {
            Ok(Some(text)) => {
                self.composer.append_transcript(&text);
                self.emit(VoiceEvent::Transcribed(text));
            }
            Ok(None) => debug!("Nothing recorded, skipping transcription"),
            Err(e) => {
                error!("Transcription failed: {}", e);
                self.emit(VoiceEvent::Error(e.user_message()));
            }
        }
        self.set_state(VoiceState::Idle);
    }

    async fn transcribe(&self, clip: &[f32], sample_rate: u32) -> Result<Option<String>> {
        if clip.is_empty() {
            return Ok(None);
        }

        let wav = encode_wav(clip, sample_rate)?;
        let audio = STANDARD.encode(&wav);
        debug!(
            "Transcribing {:.1}s of audio ({} bytes)",
            clip.len() as f32 / sample_rate as f32,
            wav.len()
        );

        let text = tokio::time::timeout(self.timeout, self.gateway.transcribe_audio(&audio))
            .await
            .map_err(|_| QurmaError::Timeout("Transcription did not finish".into()))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(QurmaError::EmptyResponse("Empty transcription".into()));
        }
        Ok(Some(text.to_string()))
    }

    fn set_state(&self, state: VoiceState) {
        *self.state.write() = state;
    }

    fn emit(&self, event: VoiceEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VoiceConfig::default();
        assert_eq!(config.silence_threshold, 10.0);
        assert_eq!(config.silence_hold(), Duration::from_millis(1000));
        assert_eq!(config.fft_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(VoiceConfig::default().with_fft_size(0).validate().is_err());
        assert!(VoiceConfig::default().with_fft_size(200).validate().is_err());
        assert!(VoiceConfig::default()
            .with_silence_threshold(300.0)
            .validate()
            .is_err());
    }
}
