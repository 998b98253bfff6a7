//! Engine facade: resolves each generation call to a reference voice and
//! drives the model.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::audio;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{tokens, SpeechModel, SynthesisParams, VoiceConditioning};
use crate::session::SessionStore;

/// Where a generation call takes its reference voice from.
#[derive(Debug, Clone)]
pub enum ConditioningSource {
    /// Handle to a stored voice session.
    Session(String),
    /// Inline reference audio, prepared for this call only and never stored.
    Inline(Vec<u8>),
}

/// One synthesis call.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub source: ConditioningSource,
    pub params: SynthesisParams,
}

/// Synthesized audio.
#[derive(Debug, Clone)]
pub struct SpeechResult {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SpeechResult {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Service object owning the model backend and the session store.
///
/// The model serializes through its own lock (one accelerator, not
/// reentrant); the session store has a separate lock, so session
/// bookkeeping never waits behind a running generation.
pub struct TtsEngine {
    model: Arc<Mutex<Box<dyn SpeechModel>>>,
    sessions: SessionStore,
}

impl TtsEngine {
    pub fn new(model: Box<dyn SpeechModel>, config: &EngineConfig) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
            sessions: SessionStore::new(config.session_ttl(), config.max_sessions),
        }
    }

    /// Prepare a reference voice and store it under a fresh session id.
    pub async fn create_voice_session(&self, audio: Vec<u8>, exaggeration: f32) -> Result<String> {
        self.sessions.cleanup();
        audio::validate_reference_audio(&audio)?;

        let model = Arc::clone(&self.model);
        let conditioning = tokio::task::spawn_blocking(move || {
            model.lock().unwrap().prepare(&audio, exaggeration)
        })
        .await
        .map_err(|e| Error::PrepareFailed(format!("prepare task failed: {}", e)))??;

        let id = self.sessions.insert(conditioning);
        info!("Voice session {} created ({} live)", id, self.sessions.len());
        Ok(id)
    }

    /// Synthesize speech for one request.
    ///
    /// Session-based calls write the possibly refined conditioning back
    /// under the same id afterwards, so conditioning may legitimately evolve
    /// call to call.
    pub async fn generate(&self, request: SpeechRequest) -> Result<SpeechResult> {
        self.sessions.cleanup();

        let SpeechRequest {
            text,
            source,
            params,
        } = request;

        if text.trim().is_empty() {
            return Err(Error::InvalidInput("text must not be empty".to_string()));
        }

        let (session_id, conditioning) = match source {
            ConditioningSource::Session(id) => {
                let conditioning = self.sessions.get(&id)?;
                (Some(id), conditioning)
            }
            ConditioningSource::Inline(audio) => {
                audio::validate_reference_audio(&audio)?;
                let model = Arc::clone(&self.model);
                let exaggeration = params.exaggeration;
                let conditioning = tokio::task::spawn_blocking(move || {
                    model.lock().unwrap().prepare(&audio, exaggeration)
                })
                .await
                .map_err(|e| Error::PrepareFailed(format!("prepare task failed: {}", e)))??;
                (None, conditioning)
            }
        };

        let model = Arc::clone(&self.model);
        let (samples, sample_rate, conditioning) = tokio::task::spawn_blocking(
            move || -> Result<(Vec<f32>, u32, VoiceConditioning)> {
                let mut model = model.lock().unwrap();
                let mut conditioning = conditioning;
                let batch = model.generate_tokens(&text, &mut conditioning, &params)?;
                let cleaned = tokens::drop_invalid_tokens_batch(&batch).to_vec();
                let samples = model.synthesize(&cleaned, &conditioning)?;
                let sample_rate = model.sample_rate();
                Ok((samples, sample_rate, conditioning))
            },
        )
        .await
        .map_err(|e| Error::GenerationFailed(format!("generation task failed: {}", e)))??;

        if let Some(id) = session_id {
            self.sessions.touch(&id, conditioning);
        }

        debug!("Generated {} samples at {} Hz", samples.len(), sample_rate);

        Ok(SpeechResult {
            samples,
            sample_rate,
        })
    }

    /// Number of live voice sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub(crate) fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tokens::{EOS, SOS};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock backend: `prepare` returns a fixed blob, `generate_tokens`
    /// appends a marker byte to the conditioning, `synthesize` echoes one
    /// sample per token and rejects stray sentinels.
    struct MockModel {
        prepare_calls: Arc<AtomicUsize>,
        generate_calls: Arc<AtomicUsize>,
        token_batch: Vec<Vec<i64>>,
        fail_generate: bool,
    }

    impl MockModel {
        fn boxed(
            prepare_calls: Arc<AtomicUsize>,
            generate_calls: Arc<AtomicUsize>,
        ) -> Box<dyn SpeechModel> {
            Box::new(Self {
                prepare_calls,
                generate_calls,
                token_batch: vec![vec![SOS, 10, 20, 30, EOS, 99]],
                fail_generate: false,
            })
        }
    }

    impl SpeechModel for MockModel {
        fn prepare(&mut self, _audio_wav: &[u8], _exaggeration: f32) -> Result<VoiceConditioning> {
            self.prepare_calls.fetch_add(1, Ordering::SeqCst);
            Ok(VoiceConditioning::from_bytes(vec![0]))
        }

        fn generate_tokens(
            &mut self,
            _text: &str,
            conditioning: &mut VoiceConditioning,
            _params: &SynthesisParams,
        ) -> Result<Vec<Vec<i64>>> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_generate {
                return Err(Error::GenerationFailed("mock failure".to_string()));
            }
            let mut refined = conditioning.as_bytes().to_vec();
            refined.push(refined.len() as u8);
            *conditioning = VoiceConditioning::from_bytes(refined);
            Ok(self.token_batch.clone())
        }

        fn synthesize(
            &mut self,
            tokens: &[i64],
            _conditioning: &VoiceConditioning,
        ) -> Result<Vec<f32>> {
            assert!(
                tokens.iter().all(|&t| t < SOS),
                "sentinels must be stripped before synthesis"
            );
            Ok(vec![0.1; tokens.len()])
        }

        fn sample_rate(&self) -> u32 {
            24_000
        }
    }

    fn engine_with_counters() -> (TtsEngine, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let prepare_calls = Arc::new(AtomicUsize::new(0));
        let generate_calls = Arc::new(AtomicUsize::new(0));
        let engine = TtsEngine::new(
            MockModel::boxed(prepare_calls.clone(), generate_calls.clone()),
            &EngineConfig::default(),
        );
        (engine, prepare_calls, generate_calls)
    }

    fn reference_wav() -> Vec<u8> {
        audio::encode_wav_pcm16(&[0.25; 256], 24_000).unwrap()
    }

    #[tokio::test]
    async fn test_inline_generation_trims_sentinels() {
        let (engine, prepare_calls, _) = engine_with_counters();

        let result = engine
            .generate(SpeechRequest {
                text: "olá mundo".to_string(),
                source: ConditioningSource::Inline(reference_wav()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap();

        // [SOS, 10, 20, 30, EOS, 99] -> [10, 20, 30]
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.sample_rate, 24_000);
        assert_eq!(prepare_calls.load(Ordering::SeqCst), 1);
        // Inline conditioning is never stored.
        assert_eq!(engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_write_back() {
        let (engine, _, _) = engine_with_counters();

        let id = engine
            .create_voice_session(reference_wav(), 0.5)
            .await
            .unwrap();
        assert_eq!(engine.session_count(), 1);

        engine
            .generate(SpeechRequest {
                text: "primeira".to_string(),
                source: ConditioningSource::Session(id.clone()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap();

        // The mock appends a byte per generation; the refined state must be
        // what the store now holds.
        assert_eq!(engine.sessions().get(&id).unwrap().as_bytes(), &[0, 1]);

        engine
            .generate(SpeechRequest {
                text: "segunda".to_string(),
                source: ConditioningSource::Session(id.clone()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap();

        assert_eq!(engine.sessions().get(&id).unwrap().as_bytes(), &[0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_session_fails_before_model() {
        let (engine, _, generate_calls) = engine_with_counters();

        let err = engine
            .generate(SpeechRequest {
                text: "olá".to_string(),
                source: ConditioningSource::Session("deadbeef".to_string()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SessionNotFound(_)));
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_text_fails_before_model() {
        let (engine, prepare_calls, generate_calls) = engine_with_counters();

        let err = engine
            .generate(SpeechRequest {
                text: "   ".to_string(),
                source: ConditioningSource::Inline(reference_wav()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(prepare_calls.load(Ordering::SeqCst), 0);
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_reference_audio_fails_before_model() {
        let (engine, prepare_calls, _) = engine_with_counters();

        let err = engine.create_voice_session(Vec::new(), 0.5).await.unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(prepare_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_surfaces_with_cause() {
        let prepare_calls = Arc::new(AtomicUsize::new(0));
        let generate_calls = Arc::new(AtomicUsize::new(0));
        let engine = TtsEngine::new(
            Box::new(MockModel {
                prepare_calls: prepare_calls.clone(),
                generate_calls: generate_calls.clone(),
                token_batch: Vec::new(),
                fail_generate: true,
            }),
            &EngineConfig::default(),
        );

        let err = engine
            .generate(SpeechRequest {
                text: "olá".to_string(),
                source: ConditioningSource::Inline(reference_wav()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_session_generation_refreshes_timestamp() {
        let (engine, _, _) = engine_with_counters();

        let id = engine
            .create_voice_session(reference_wav(), 0.5)
            .await
            .unwrap();
        let created = engine.sessions().updated_at(&id).unwrap();

        engine
            .generate(SpeechRequest {
                text: "olá".to_string(),
                source: ConditioningSource::Session(id.clone()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap();
        let after_first = engine.sessions().updated_at(&id).unwrap();

        engine
            .generate(SpeechRequest {
                text: "olá de novo".to_string(),
                source: ConditioningSource::Session(id.clone()),
                params: SynthesisParams::default(),
            })
            .await
            .unwrap();
        let after_second = engine.sessions().updated_at(&id).unwrap();

        assert!(after_first >= created);
        assert!(after_second >= after_first);
        assert_ne!(
            engine.sessions().get(&id).unwrap().as_bytes().len(),
            1,
            "write-back must have replaced the original conditioning"
        );
    }
}
