//! Audio primitives: analysis tap, clip encoding, capture and playback

pub mod analyser;
pub mod buffer;
pub mod input;
pub mod output;
pub mod wav;

pub use analyser::{SpectrumAnalyser, DEFAULT_FFT_SIZE};
pub use buffer::AudioRingBuffer;
#[cfg(feature = "audio-io")]
pub use input::CpalCapture;
pub use input::{AudioCapture, CaptureStream, ScriptedCapture};
#[cfg(feature = "audio-io")]
pub use output::RodioOutput;
pub use output::{AudioSink, CollectingSink, UnavailableSink};
pub use wav::{decode_pcm16_le, decode_wav, encode_wav, to_pcm16};

/// Sample rate of synthesized speech and live replies
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
