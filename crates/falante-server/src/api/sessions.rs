//! Voice-session creation endpoint.

use std::time::Duration;

use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use falante_core::{audio, Error};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub audio_prompt_base64: Option<String>,
    #[serde(default = "default_exaggeration")]
    pub exaggeration: f32,
}

fn default_exaggeration() -> f32 {
    0.5
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub voice_session_id: String,
}

pub async fn create_voice_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let req: CreateSessionRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("invalid_json"))?;

    let audio_b64 = match req.audio_prompt_base64.as_deref() {
        Some(b64) if !b64.is_empty() => b64,
        _ => return Err(ApiError::bad_request("missing_audio_prompt")),
    };
    let reference = audio::decode_base64(audio_b64)
        .map_err(|_| ApiError::bad_request("missing_audio_prompt"))?;

    info!("Voice session request: {} reference bytes", reference.len());

    let _permit = state.acquire_permit().await;
    let timeout = Duration::from_secs(state.request_timeout_secs);

    let id = tokio::time::timeout(
        timeout,
        state.engine.create_voice_session(reference, req.exaggeration),
    )
    .await
    .map_err(|_| ApiError::internal("voice_session_prepare_failed", "request timed out"))?
    .map_err(map_error)?;

    Ok(Json(CreateSessionResponse {
        voice_session_id: id,
    }))
}

fn map_error(err: Error) -> ApiError {
    match err {
        Error::InvalidInput(_) => ApiError::bad_request("missing_audio_prompt"),
        other => ApiError::internal("voice_session_prepare_failed", other.to_string()),
    }
}
