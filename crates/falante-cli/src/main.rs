//! Falante batch driver: reads a JSON job list, prepares one reference
//! voice, and synthesizes each job to a WAV file.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use falante_core::model::worker::WorkerBridge;
use falante_core::{
    audio, ConditioningSource, EngineConfig, SpeechRequest, SynthesisParams, TtsEngine,
};

/// Batch text-to-speech driver.
///
/// The job payload mirrors the server's generation contract:
///
/// ```json
/// {
///   "audio_prompt_path": "reference.wav",
///   "language_id": "pt",
///   "jobs": [
///     {"text": "Primeira parte.", "out_path": "parte1.wav"},
///     {"text": "Segunda parte.", "out_path": "parte2.wav"}
///   ]
/// }
/// ```
#[derive(Parser)]
#[command(name = "falante", about = "Batch text-to-speech driver", version)]
struct Cli {
    /// Job payload file; reads stdin when omitted.
    #[arg(long, value_name = "PATH")]
    jobs: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct BatchPayload {
    jobs: Vec<Job>,
    /// Reference voice shared by every job.
    audio_prompt_path: PathBuf,
    #[serde(flatten)]
    params: SynthesisParams,
}

#[derive(Debug, Deserialize)]
struct Job {
    text: String,
    out_path: PathBuf,
    #[serde(default)]
    log_prefix: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let raw = match &cli.jobs {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading job payload {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading job payload from stdin")?;
            buffer
        }
    };
    if raw.trim().is_empty() {
        bail!("no input JSON received");
    }

    let payload: BatchPayload = serde_json::from_str(&raw).context("invalid job payload")?;
    if payload.jobs.is_empty() {
        bail!("no jobs provided");
    }

    let config = EngineConfig::from_env();
    let engine = TtsEngine::new(Box::new(WorkerBridge::new(&config)), &config);

    let reference = fs::read(&payload.audio_prompt_path).with_context(|| {
        format!(
            "reading reference audio {}",
            payload.audio_prompt_path.display()
        )
    })?;
    let session = engine
        .create_voice_session(reference, payload.params.exaggeration)
        .await?;

    let total = payload.jobs.len();
    for (idx, job) in payload.jobs.iter().enumerate() {
        let prefix = job
            .log_prefix
            .clone()
            .unwrap_or_else(|| format!("[{}/{}]", idx + 1, total));
        info!("{} started", prefix);

        let speech = engine
            .generate(SpeechRequest {
                text: job.text.clone(),
                source: ConditioningSource::Session(session.clone()),
                params: payload.params.clone(),
            })
            .await?;

        let wav = audio::encode_wav_pcm16(&speech.samples, speech.sample_rate)?;
        fs::write(&job.out_path, wav)
            .with_context(|| format!("writing {}", job.out_path.display()))?;

        info!(
            "{} wrote {} ({:.1}s)",
            prefix,
            job.out_path.display(),
            speech.duration_secs()
        );
    }

    println!("OK");
    Ok(())
}
