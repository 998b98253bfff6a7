//! WAV encode/decode helpers shared by the engine, server, and CLI.

use std::io::Cursor;

use crate::error::{Error, Result};

/// Decode a base64 payload, tolerating data-URL prefixes and whitespace.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    use base64::Engine;

    let payload = if data.starts_with("data:") {
        data.split_once(',').map(|(_, b64)| b64).unwrap_or(data)
    } else {
        data
    };

    let normalized: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| Error::InvalidInput(format!("base64 decode error: {}", e)))
}

/// Check that an uploaded reference voice is a non-empty, parsable WAV.
///
/// Runs before the model is consulted, so malformed uploads fail as client
/// errors instead of surfacing as conditioning failures.
pub fn validate_reference_audio(audio_wav: &[u8]) -> Result<()> {
    if audio_wav.is_empty() {
        return Err(Error::InvalidInput("empty audio prompt".to_string()));
    }

    hound::WavReader::new(Cursor::new(audio_wav))
        .map(|_| ())
        .map_err(|e| Error::InvalidInput(format!("undecodable audio prompt: {}", e)))
}

/// Encode mono f32 samples as a PCM16 WAV container.
///
/// Samples are clamped to [-1.0, 1.0] before quantization, so out-of-range
/// input clips instead of wrapping.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::GenerationFailed(format!("wav encode error: {}", e)))?;
        for &sample in samples {
            let quantized = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| Error::GenerationFailed(format!("wav encode error: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::GenerationFailed(format!("wav encode error: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

/// Parse a WAV byte buffer back into mono f32 samples in [-1.0, 1.0].
///
/// Multi-channel input is averaged down to mono.
pub fn decode_wav_samples(wav_bytes: &[u8]) -> Result<Vec<f32>> {
    let cursor = Cursor::new(wav_bytes);
    let mut reader = hound::WavReader::new(cursor)
        .map_err(|e| Error::GenerationFailed(format!("failed to parse WAV: {}", e)))?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let mut samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.max(1) as u32;
            let max_val = if bits > 1 {
                ((1i64 << (bits - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| (s as f32 / max_val).clamp(-1.0, 1.0))
                .collect()
        }
        hound::SampleFormat::Float => reader.samples::<f32>().filter_map(|s| s.ok()).collect(),
    };

    if channels > 1 {
        let mut mono = Vec::with_capacity(samples.len() / channels + 1);
        for frame in samples.chunks(channels) {
            let sum: f32 = frame.iter().copied().sum();
            mono.push(sum / frame.len() as f32);
        }
        samples = mono;
    }

    Ok(samples)
}
