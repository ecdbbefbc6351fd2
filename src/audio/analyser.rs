//! Frequency-domain level meter
//!
//! Produces the same 0-255 byte spectrum a browser `AnalyserNode` reports:
//! Blackman window, FFT, exponential smoothing across calls, then decibels
//! mapped linearly from `[min_db, max_db]` onto bytes.

use crate::audio::buffer::AudioRingBuffer;
use crate::{QurmaError, Result};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

pub const DEFAULT_FFT_SIZE: usize = 256;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

pub struct SpectrumAnalyser {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: AudioRingBuffer,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    smoothing: f32,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize) -> Result<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(QurmaError::ConfigError(format!(
                "FFT size must be a power of two, got {}",
                fft_size
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            fft_size,
            fft,
            window: blackman(fft_size),
            samples: AudioRingBuffer::new(fft_size),
            scratch: vec![Complex32::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            smoothing: DEFAULT_SMOOTHING,
        })
    }

    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing.clamp(0.0, 1.0);
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Feed mono samples in [-1, 1]
    pub fn push(&mut self, samples: &[f32]) {
        self.samples.write(samples);
    }

    /// Spectrum of the latest window, one byte per bin (`fft_size / 2` bins)
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let frame = self.samples.snapshot();
        for (dst, (&x, &w)) in self.scratch.iter_mut().zip(frame.iter().zip(&self.window)) {
            *dst = Complex32::new(x * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;

        self.smoothed
            .iter_mut()
            .zip(&self.scratch)
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() * scale;
                *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

                if *smoothed <= 0.0 {
                    return 0;
                }
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Mean of [`Self::byte_frequency_data`], the value silence detection watches
    pub fn mean_level(&mut self) -> f32 {
        let bins = self.byte_frequency_data();
        if bins.is_empty() {
            return 0.0;
        }
        bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32
    }

    /// Forget history, e.g. between recordings
    pub fn reset(&mut self) {
        self.samples.clear();
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

fn blackman(size: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;

    (0..size)
        .map(|n| {
            let x = n as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, freq_bin: f32, amplitude: f32, size: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq_bin * i as f32 / size as f32).sin())
            .collect()
    }

    #[test]
    fn test_rejects_bad_fft_size() {
        assert!(SpectrumAnalyser::new(0).is_err());
        assert!(SpectrumAnalyser::new(300).is_err());
        assert!(SpectrumAnalyser::new(256).is_ok());
    }

    #[test]
    fn test_silence_reads_zero() {
        let mut analyser = SpectrumAnalyser::new(256).unwrap();
        analyser.push(&[0.0; 512]);
        assert_eq!(analyser.mean_level(), 0.0);
        assert!(analyser.byte_frequency_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bin_count() {
        let mut analyser = SpectrumAnalyser::new(256).unwrap();
        assert_eq!(analyser.byte_frequency_data().len(), 128);
    }

    #[test]
    fn test_loud_tone_fills_its_bin_only() {
        let mut analyser = SpectrumAnalyser::new(256).unwrap().with_smoothing(0.0);
        analyser.push(&tone(256, 16.0, 0.9, 256));

        let bins = analyser.byte_frequency_data();
        assert_eq!(bins[16], 255);
        assert_eq!(bins[60], 0);
        assert_eq!(bins[100], 0);
    }

    #[test]
    fn test_smoothing_decays_gradually() {
        let mut analyser = SpectrumAnalyser::new(256).unwrap();
        analyser.push(&tone(256, 16.0, 0.9, 256));
        let loud = analyser.mean_level();

        analyser.push(&[0.0; 256]);
        let after = analyser.mean_level();
        assert!(after > 0.0, "smoothing keeps some energy");
        assert!(after < loud);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut analyser = SpectrumAnalyser::new(256).unwrap();
        analyser.push(&tone(256, 16.0, 0.9, 256));
        analyser.mean_level();
        analyser.reset();
        assert_eq!(analyser.mean_level(), 0.0);
    }

    #[test]
    fn test_blackman_endpoints() {
        let window = blackman(256);
        assert!(window[0].abs() < 1e-6);
        assert!((window[128] - 1.0).abs() < 1e-4);
    }
}
