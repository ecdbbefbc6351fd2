//! Speaker playback

use crate::{QurmaError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Destination for decoded mono audio
pub trait AudioSink: Send + Sync {
    /// Play a whole clip, returning when it has finished
    fn play_blocking(&self, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Queue a chunk behind whatever is already playing
    fn enqueue(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()>;

    /// Drop all queued audio immediately
    fn clear(&self);
}

/// Sink that records what it was asked to play
#[derive(Clone, Default)]
pub struct CollectingSink {
    played: Arc<Mutex<Vec<(Vec<f32>, u32)>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<(Vec<f32>, u32)> {
        self.played.lock().clone()
    }
}

impl AudioSink for CollectingSink {
    fn play_blocking(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        self.played.lock().push((samples.to_vec(), sample_rate));
        Ok(())
    }

    fn enqueue(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        self.played.lock().push((samples, sample_rate));
        Ok(())
    }

    fn clear(&self) {
        self.played.lock().clear();
    }
}

/// Stand-in when no output device could be opened; every request fails
#[derive(Debug, Clone)]
pub struct UnavailableSink {
    reason: String,
}

impl UnavailableSink {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioSink for UnavailableSink {
    fn play_blocking(&self, _samples: &[f32], _sample_rate: u32) -> Result<()> {
        Err(QurmaError::AudioDeviceError(self.reason.clone()))
    }

    fn enqueue(&self, _samples: Vec<f32>, _sample_rate: u32) -> Result<()> {
        Err(QurmaError::AudioDeviceError(self.reason.clone()))
    }

    fn clear(&self) {}
}

#[cfg(feature = "audio-io")]
pub use device::RodioOutput;

#[cfg(feature = "audio-io")]
mod device {
    use super::AudioSink;
    use crate::{QurmaError, Result};
    use parking_lot::Mutex;
    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, OutputStreamHandle, Sink};
    use tracing::{debug, info};

    /// Default output device through rodio.
    ///
    /// The output stream is pinned to its own thread; only the handle is shared.
    pub struct RodioOutput {
        handle: OutputStreamHandle,
        queue: Mutex<Option<Sink>>,
        _release: crossbeam_channel::Sender<()>,
    }

    impl RodioOutput {
        pub fn new() -> Result<Self> {
            let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
            let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

            std::thread::Builder::new()
                .name("qurma-speaker".into())
                .spawn(move || match OutputStream::try_default() {
                    Ok((stream, handle)) => {
                        let _ = ready_tx.send(Ok(handle));
                        let _ = release_rx.recv();
                        drop(stream);
                        debug!("Released output device");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(QurmaError::AudioDeviceError(format!(
                            "No output device available: {}",
                            e
                        ))));
                    }
                })
                .map_err(|e| QurmaError::AudioDeviceError(format!("Failed to spawn output thread: {}", e)))?;

            let handle = ready_rx
                .recv()
                .map_err(|_| QurmaError::AudioDeviceError("Output thread exited".into()))??;

            info!("Audio output ready");
            Ok(Self {
                handle,
                queue: Mutex::new(None),
                _release: release_tx,
            })
        }

        fn new_sink(&self) -> Result<Sink> {
            Sink::try_new(&self.handle)
                .map_err(|e| QurmaError::AudioDeviceError(format!("Failed to open sink: {}", e)))
        }
    }

    impl AudioSink for RodioOutput {
        fn play_blocking(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
            let sink = self.new_sink()?;
            sink.append(SamplesBuffer::new(1, sample_rate, samples.to_vec()));
            sink.sleep_until_end();
            Ok(())
        }

        fn enqueue(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
            let mut queue = self.queue.lock();
            if queue.is_none() {
                *queue = Some(self.new_sink()?);
            }
            if let Some(sink) = queue.as_ref() {
                sink.append(SamplesBuffer::new(1, sample_rate, samples));
            }
            Ok(())
        }

        fn clear(&self) {
            if let Some(sink) = self.queue.lock().take() {
                sink.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.play_blocking(&[0.1, 0.2], 24000).unwrap();
        sink.enqueue(vec![0.3], 16000).unwrap();

        let played = sink.played();
        assert_eq!(played.len(), 2);
        assert_eq!(played[0], (vec![0.1, 0.2], 24000));

        sink.clear();
        assert!(sink.played().is_empty());
    }

    #[cfg(feature = "audio-io")]
    #[test]
    fn test_rodio_output_creation() {
        // No output device in CI; only check it doesn't panic
        let _ = RodioOutput::new();
    }
}
