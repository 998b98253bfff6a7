//! Speech generation endpoint.

use std::time::Duration;

use axum::{body::Bytes, extract::State, Json};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use falante_core::{audio, ConditioningSource, Error, SpeechRequest, SynthesisParams};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice_session_id: Option<String>,
    #[serde(default)]
    pub audio_prompt_base64: Option<String>,
    #[serde(flatten)]
    pub params: SynthesisParams,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub audio_wav_base64: String,
}

pub async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError> {
    let req: GenerateRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("invalid_json"))?;

    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("missing_text"));
    }

    let session_id = req.voice_session_id.as_deref().filter(|s| !s.is_empty());
    let inline_b64 = req.audio_prompt_base64.as_deref().filter(|s| !s.is_empty());

    // Exactly one conditioning source; neither and both are both client
    // errors, raised before the model is ever consulted.
    let source = match (session_id, inline_b64) {
        (Some(id), None) => ConditioningSource::Session(id.to_string()),
        (None, Some(b64)) => {
            let reference = audio::decode_base64(b64)
                .map_err(|_| ApiError::bad_request("missing_text_or_audio"))?;
            ConditioningSource::Inline(reference)
        }
        (Some(_), Some(_)) => return Err(ApiError::bad_request("conflicting_voice_source")),
        (None, None) => return Err(ApiError::bad_request("missing_text_or_audio")),
    };

    info!(
        "Generate request: {} chars, {}",
        req.text.len(),
        match &source {
            ConditioningSource::Session(id) => format!("session {}", id),
            ConditioningSource::Inline(audio) => format!("inline ({} bytes)", audio.len()),
        }
    );

    let _permit = state.acquire_permit().await;
    let timeout = Duration::from_secs(state.request_timeout_secs);

    let speech = tokio::time::timeout(
        timeout,
        state.engine.generate(SpeechRequest {
            text: req.text,
            source,
            params: req.params,
        }),
    )
    .await
    .map_err(|_| ApiError::internal("generate_failed", "request timed out"))?
    .map_err(map_error)?;

    info!(
        "Generated {:.2}s of audio at {} Hz",
        speech.duration_secs(),
        speech.sample_rate
    );

    let sample_rate = speech.sample_rate;
    let samples = speech.samples;
    let wav = tokio::task::spawn_blocking(move || audio::encode_wav_pcm16(&samples, sample_rate))
        .await
        .map_err(|e| ApiError::internal("generate_failed", format!("encode task failed: {}", e)))?
        .map_err(|e| ApiError::internal("generate_failed", e.to_string()))?;

    Ok(Json(GenerateResponse {
        audio_wav_base64: base64::engine::general_purpose::STANDARD.encode(wav),
    }))
}

fn map_error(err: Error) -> ApiError {
    match err {
        Error::SessionNotFound(_) => ApiError::bad_request("invalid_voice_session"),
        Error::InvalidInput(_) => ApiError::bad_request("missing_text_or_audio"),
        Error::PrepareFailed(detail) => ApiError::internal("inline_prepare_failed", detail),
        Error::GenerationFailed(detail) => ApiError::internal("generate_failed", detail),
    }
}
