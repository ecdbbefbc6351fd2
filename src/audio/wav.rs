use crate::{QurmaError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

/// Encode mono samples (f32, -1.0 to 1.0) as an in-memory 16-bit PCM WAV clip
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| QurmaError::AudioProcessingError(format!("Failed to create WAV writer: {}", e)))?;

        for sample in to_pcm16(samples) {
            writer
                .write_sample(sample)
                .map_err(|e| QurmaError::AudioProcessingError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| QurmaError::AudioProcessingError(format!("Failed to finalize WAV: {}", e)))?;
    }

    debug!("Encoded {} samples at {} Hz", samples.len(), sample_rate);
    Ok(cursor.into_inner())
}

/// Decode a 16-bit WAV clip; returns (samples, sample_rate)
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| QurmaError::AudioProcessingError(format!("Failed to open WAV: {}", e)))?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(QurmaError::AudioProcessingError(format!(
            "Unsupported WAV format: {:?} {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let samples = reader
        .samples::<i16>()
        .map(|s| {
            s.map(|sample| sample as f32 / i16::MAX as f32)
                .map_err(|e| QurmaError::AudioProcessingError(format!("Failed to read sample: {}", e)))
        })
        .collect::<Result<Vec<f32>>>()?;

    Ok((samples, spec.sample_rate))
}

/// Decode raw little-endian 16-bit PCM; a trailing odd byte is ignored
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Average interleaved frames down to one channel
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
