//! Microphone capture
//!
//! [`AudioCapture::open`] acquires the device and returns a [`CaptureStream`]
//! of mono frames; dropping the stream releases the device.

use crate::{QurmaError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub trait AudioCapture: Send + Sync {
    fn open(&self) -> Result<CaptureStream>;
}

/// Live microphone feed. Holds the device until dropped.
pub struct CaptureStream {
    sample_rate: u32,
    frames: mpsc::UnboundedReceiver<Vec<f32>>,
    _device: Box<dyn Send>,
}

impl CaptureStream {
    pub fn new(
        sample_rate: u32,
        frames: mpsc::UnboundedReceiver<Vec<f32>>,
        device: impl Send + 'static,
    ) -> Self {
        Self {
            sample_rate,
            frames,
            _device: Box::new(device),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Next mono frame; `None` once the device has gone away
    pub async fn next_frame(&mut self) -> Option<Vec<f32>> {
        self.frames.recv().await
    }
}

/// Capture that plays back canned frames at a fixed interval, then stays open
/// and silent until released
#[derive(Clone)]
pub struct ScriptedCapture {
    sample_rate: u32,
    frames: Vec<Vec<f32>>,
    interval: Duration,
    failure: Option<QurmaError>,
    open_streams: Arc<AtomicUsize>,
}

impl ScriptedCapture {
    pub fn new(sample_rate: u32, frames: Vec<Vec<f32>>, interval: Duration) -> Self {
        Self {
            sample_rate,
            frames,
            interval,
            failure: None,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A capture whose device can never be opened
    pub fn failing(error: QurmaError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(16000, Vec::new(), Duration::from_millis(10))
        }
    }

    /// Number of streams currently holding the device
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

struct ScriptedDevice(Arc<AtomicUsize>);

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AudioCapture for ScriptedCapture {
    fn open(&self) -> Result<CaptureStream> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let frames = self.frames.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            for frame in frames {
                tokio::time::sleep(interval).await;
                if tx.send(frame).is_err() {
                    return;
                }
            }
            tx.closed().await;
        });

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        debug!("Scripted capture opened");
        Ok(CaptureStream::new(
            self.sample_rate,
            rx,
            ScriptedDevice(Arc::clone(&self.open_streams)),
        ))
    }
}

#[cfg(feature = "audio-io")]
pub use device::CpalCapture;

#[cfg(feature = "audio-io")]
mod device {
    use super::{AudioCapture, CaptureStream};
    use crate::audio::wav::downmix;
    use crate::{QurmaError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream};
    use tokio::sync::mpsc;
    use tracing::{error, info};

    /// Default input device through cpal.
    ///
    /// The cpal stream is not `Send`, so it lives on its own thread until the
    /// returned [`CaptureStream`] is dropped.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CpalCapture;

    impl AudioCapture for CpalCapture {
        fn open(&self) -> Result<CaptureStream> {
            let (frame_tx, frames) = mpsc::unbounded_channel();
            let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32>>(1);
            let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

            std::thread::Builder::new()
                .name("qurma-mic".into())
                .spawn(move || {
                    let (stream, sample_rate) = match build_stream(frame_tx) {
                        Ok(opened) => opened,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(sample_rate));

                    // Returns once the sender side is dropped
                    let _ = release_rx.recv();
                    drop(stream);
                    info!("Released microphone");
                })
                .map_err(|e| QurmaError::AudioDeviceError(format!("Failed to spawn capture thread: {}", e)))?;

            let sample_rate = ready_rx
                .recv()
                .map_err(|_| QurmaError::AudioDeviceError("Capture thread exited".into()))??;

            Ok(CaptureStream::new(sample_rate, frames, release_tx))
        }
    }

    fn build_stream(frame_tx: mpsc::UnboundedSender<Vec<f32>>) -> Result<(Stream, u32)> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| QurmaError::AudioDeviceError("No input device available".into()))?;

        info!("Using input device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));

        let supported = device
            .default_input_config()
            .map_err(|e| QurmaError::AudioDeviceError(format!("Failed to get input config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        let err_fn = |err| {
            error!("Audio input stream error: {}", err);
        };

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = frame_tx.send(downmix(data, channels));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    let _ = frame_tx.send(downmix(&samples, channels));
                },
                err_fn,
                None,
            ),
            other => {
                return Err(QurmaError::AudioDeviceError(format!(
                    "Unsupported input sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| QurmaError::AudioDeviceError(format!("Failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| QurmaError::AudioDeviceError(format!("Failed to start input stream: {}", e)))?;

        info!("Started audio capture at {} Hz", sample_rate);
        Ok((stream, sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_capture_delivers_frames() {
        let capture = ScriptedCapture::new(
            16000,
            vec![vec![0.1; 4], vec![0.2; 4]],
            Duration::from_millis(20),
        );
        let mut stream = capture.open().unwrap();
        assert_eq!(stream.sample_rate(), 16000);
        assert_eq!(capture.open_streams(), 1);

        assert_eq!(stream.next_frame().await, Some(vec![0.1; 4]));
        assert_eq!(stream.next_frame().await, Some(vec![0.2; 4]));

        drop(stream);
        assert_eq!(capture.open_streams(), 0);
    }

    #[test]
    fn test_failing_capture() {
        let capture = ScriptedCapture::failing(QurmaError::AudioDeviceError("denied".into()));
        assert!(matches!(capture.open(), Err(QurmaError::AudioDeviceError(_))));
        assert_eq!(capture.open_streams(), 0);
    }
}
