//! Voice input and read-aloud output
//!
//! - [`capture`]: microphone recording with silence auto-stop and transcription
//! - [`tts`]: remote speech synthesis played through an audio sink

pub mod capture;
pub mod silence;
pub mod tts;

pub use capture::{VoiceConfig, VoiceEvent, VoicePipeline, VoiceState};
pub use silence::SilenceDetector;
pub use tts::{clean_for_speech, SpeakOutcome, SpeechSynthesizer};
