use crate::api::SpeechPayload;
use crate::error::{PipelineError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::Serialize;

const DEFAULT_PCM_RATE: u32 = 24_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioArtifact {
    #[serde(skip)]
    pub bytes: Bytes,
    pub mime_type: String,
}

impl AudioArtifact {
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/wav" => "wav",
            "audio/ogg" => "ogg",
            _ => "mp3",
        }
    }
}

fn pcm_sample_rate(mime: &str) -> Option<u32> {
    let lower = mime.to_ascii_lowercase();
    if !(lower.starts_with("audio/l16") || lower.starts_with("audio/pcm")) {
        return None;
    }
    let rate = lower
        .split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PCM_RATE);
    Some(rate)
}

/// 16-bit mono PCM in a RIFF/WAVE container.
fn wav_from_pcm(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits: u16 = 16;
    let block_align = channels * bits / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

pub fn decode_speech(payload: &SpeechPayload) -> Result<AudioArtifact> {
    let cleaned: String = payload
        .data_base64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let raw = BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| PipelineError::malformed("audio", e.to_string()))?;

    if raw.is_empty() {
        return Err(PipelineError::EmptyAudioPayload);
    }

    let mime = payload.mime_type.as_deref().unwrap_or("audio/mpeg");
    let artifact = match pcm_sample_rate(mime) {
        Some(rate) => AudioArtifact {
            bytes: Bytes::from(wav_from_pcm(&raw, rate)),
            mime_type: "audio/wav".to_string(),
        },
        None => AudioArtifact {
            bytes: Bytes::from(raw),
            mime_type: mime.to_string(),
        },
    };
    Ok(artifact)
}
