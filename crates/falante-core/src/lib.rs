//! Falante Core - voice-cloning text-to-speech engine
//!
//! This crate provides the server-side machinery around an external TTS
//! model: a bounded cache of prepared reference voices ("voice sessions"),
//! the dispatch logic that resolves a generation call to a stored or inline
//! reference voice, the decode-path token cleanup, and PCM16 WAV encoding.
//!
//! The model itself is an external collaborator reached through the
//! [`model::SpeechModel`] trait; the production backend talks to a
//! persistent Python worker over a Unix socket.
//!
//! # Example
//!
//! ```ignore
//! use falante_core::model::worker::WorkerBridge;
//! use falante_core::{EngineConfig, TtsEngine};
//!
//! let config = EngineConfig::from_env();
//! let engine = TtsEngine::new(Box::new(WorkerBridge::new(&config)), &config);
//!
//! let session = engine.create_voice_session(reference_wav, 0.5).await?;
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;

pub use config::EngineConfig;
pub use engine::{ConditioningSource, SpeechRequest, SpeechResult, TtsEngine};
pub use error::{Error, Result};
pub use model::{SpeechModel, SynthesisParams, VoiceConditioning};
pub use session::SessionStore;
