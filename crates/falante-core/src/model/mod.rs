//! The external TTS model, reached only through this seam.

pub mod tokens;
pub mod worker;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque reference-voice state produced by [`SpeechModel::prepare`].
///
/// The engine stores and forwards the blob; only the model backend
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConditioning(Vec<u8>);

impl VoiceConditioning {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Sampling parameters for one synthesis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    #[serde(default = "default_language_id")]
    pub language_id: String,

    /// Emotion exaggeration applied to the reference voice.
    #[serde(default = "default_exaggeration")]
    pub exaggeration: f32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Classifier-free-guidance weight.
    #[serde(default = "default_cfg_weight")]
    pub cfg_weight: f32,

    #[serde(default = "default_min_p")]
    pub min_p: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
}

fn default_language_id() -> String {
    "pt".to_string()
}
fn default_exaggeration() -> f32 {
    0.5
}
fn default_temperature() -> f32 {
    0.8
}
fn default_cfg_weight() -> f32 {
    0.5
}
fn default_min_p() -> f32 {
    0.05
}
fn default_top_p() -> f32 {
    1.0
}
fn default_repetition_penalty() -> f32 {
    1.2
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            language_id: default_language_id(),
            exaggeration: default_exaggeration(),
            temperature: default_temperature(),
            cfg_weight: default_cfg_weight(),
            min_p: default_min_p(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
        }
    }
}

/// Interface to the TTS model.
///
/// Implementations are not reentrant: the engine serializes every call
/// through one lock, so `&mut self` is taken throughout.
pub trait SpeechModel: Send {
    /// Build conditioning state from a reference-voice WAV.
    fn prepare(&mut self, audio_wav: &[u8], exaggeration: f32) -> Result<VoiceConditioning>;

    /// Generate the raw speech-token batch for `text`, sentinels included.
    ///
    /// The batch dimension is always 1 for current backends. The model may
    /// refine `conditioning` in place as a side effect of generating; the
    /// refined state is what the session store writes back afterwards.
    fn generate_tokens(
        &mut self,
        text: &str,
        conditioning: &mut VoiceConditioning,
        params: &SynthesisParams,
    ) -> Result<Vec<Vec<i64>>>;

    /// Vocode a cleaned token sequence into mono f32 samples.
    fn synthesize(&mut self, tokens: &[i64], conditioning: &VoiceConditioning) -> Result<Vec<f32>>;

    /// Native output sample rate.
    fn sample_rate(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults_match_wire_contract() {
        let params: SynthesisParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.language_id, "pt");
        assert_eq!(params.exaggeration, 0.5);
        assert_eq!(params.temperature, 0.8);
        assert_eq!(params.cfg_weight, 0.5);
        assert_eq!(params.min_p, 0.05);
        assert_eq!(params.top_p, 1.0);
        assert_eq!(params.repetition_penalty, 1.2);
    }
}
