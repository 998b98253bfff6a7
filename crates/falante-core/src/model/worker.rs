//! Bridge to the persistent Python model worker.
//!
//! The worker owns the actual chatterbox model; this side owns sessions,
//! dispatch, and audio framing. Requests travel as length-prefixed JSON over
//! a Unix socket, and conditioning state travels as an opaque base64 blob so
//! the Rust side keeps the canonical copy.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{SpeechModel, SynthesisParams, VoiceConditioning};

/// Chatterbox vocoder output rate; updated from the worker's `check` reply.
const DEFAULT_SAMPLE_RATE: u32 = 24_000;

const READ_TIMEOUT: Duration = Duration::from_secs(120);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exaggeration: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conditioning_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a SynthesisParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tokens: Option<&'a [i64]>,
}

impl WorkerRequest<'_> {
    fn new(command: &'static str) -> Self {
        Self {
            command,
            audio_base64: None,
            exaggeration: None,
            text: None,
            conditioning_base64: None,
            params: None,
            tokens: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    conditioning_base64: Option<String>,
    #[serde(default)]
    tokens: Option<Vec<Vec<i64>>>,
    #[serde(default)]
    audio_base64: Option<String>,
}

/// [`SpeechModel`] backend that drives the Python worker daemon.
pub struct WorkerBridge {
    socket_path: PathBuf,
    script_path: PathBuf,
    python_cmd: String,
    daemon: Option<Child>,
    sample_rate: u32,
}

impl WorkerBridge {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            socket_path: config.worker_socket.clone(),
            script_path: config.worker_script.clone(),
            python_cmd: config.python_cmd.clone(),
            daemon: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Verify the worker is reachable, starting it if necessary, and pick up
    /// its reported device and sample rate.
    pub fn probe(&mut self) -> Result<()> {
        let response = self
            .call(&WorkerRequest::new("check"))
            .map_err(Error::GenerationFailed)?;

        if let Some(rate) = response.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(device) = response.device {
            info!("Model worker ready on device: {}", device);
        }
        Ok(())
    }

    fn connect(&self) -> std::io::Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(READ_TIMEOUT)).ok();
        stream.set_write_timeout(Some(WRITE_TIMEOUT)).ok();
        Ok(stream)
    }

    /// Start the worker daemon and wait for its socket to accept
    /// connections (up to 10 seconds).
    fn spawn_daemon(&mut self) -> std::result::Result<UnixStream, String> {
        info!("Starting model worker: {}", self.script_path.display());

        let child = Command::new(&self.python_cmd)
            .arg(&self.script_path)
            .arg("--socket")
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start worker: {}", e))?;
        self.daemon = Some(child);

        for _ in 0..100 {
            std::thread::sleep(Duration::from_millis(100));
            if let Ok(stream) = self.connect() {
                info!("Model worker started");
                return Ok(stream);
            }
        }

        Err("worker did not come up within 10 seconds".to_string())
    }

    fn call(&mut self, request: &WorkerRequest) -> std::result::Result<WorkerResponse, String> {
        let mut stream = match self.connect() {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Worker socket not reachable ({}), spawning daemon", e);
                self.spawn_daemon()?
            }
        };

        let payload = serde_json::to_vec(request)
            .map_err(|e| format!("failed to serialize worker request: {}", e))?;

        stream
            .write_all(&(payload.len() as u32).to_be_bytes())
            .and_then(|_| stream.write_all(&payload))
            .and_then(|_| stream.flush())
            .map_err(|e| format!("failed to write worker request: {}", e))?;

        let mut length_buf = [0u8; 4];
        stream
            .read_exact(&mut length_buf)
            .map_err(|e| format!("failed to read worker response length: {}", e))?;
        let response_len = u32::from_be_bytes(length_buf) as usize;

        let mut response_buf = vec![0u8; response_len];
        stream
            .read_exact(&mut response_buf)
            .map_err(|e| format!("failed to read worker response: {}", e))?;

        let response: WorkerResponse = serde_json::from_slice(&response_buf).map_err(|e| {
            format!(
                "failed to parse worker response: {} - {}",
                e,
                String::from_utf8_lossy(&response_buf)
            )
        })?;

        if let Some(err) = response.error {
            return Err(err);
        }
        if let Some(rate) = response.sample_rate {
            self.sample_rate = rate;
        }
        Ok(response)
    }

    fn encode_conditioning(conditioning: &VoiceConditioning) -> String {
        base64::engine::general_purpose::STANDARD.encode(conditioning.as_bytes())
    }

    fn decode_conditioning(b64: &str) -> std::result::Result<VoiceConditioning, String> {
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map(VoiceConditioning::from_bytes)
            .map_err(|e| format!("bad conditioning blob from worker: {}", e))
    }
}

impl SpeechModel for WorkerBridge {
    fn prepare(&mut self, audio_wav: &[u8], exaggeration: f32) -> Result<VoiceConditioning> {
        let request = WorkerRequest {
            audio_base64: Some(base64::engine::general_purpose::STANDARD.encode(audio_wav)),
            exaggeration: Some(exaggeration),
            ..WorkerRequest::new("prepare")
        };

        let response = self.call(&request).map_err(Error::PrepareFailed)?;
        let blob = response
            .conditioning_base64
            .ok_or_else(|| Error::PrepareFailed("no conditioning in worker reply".to_string()))?;
        Self::decode_conditioning(&blob).map_err(Error::PrepareFailed)
    }

    fn generate_tokens(
        &mut self,
        text: &str,
        conditioning: &mut VoiceConditioning,
        params: &SynthesisParams,
    ) -> Result<Vec<Vec<i64>>> {
        let request = WorkerRequest {
            text: Some(text),
            conditioning_base64: Some(Self::encode_conditioning(conditioning)),
            params: Some(params),
            ..WorkerRequest::new("generate")
        };

        let response = self.call(&request).map_err(Error::GenerationFailed)?;

        // The worker may refine the conditioning while generating; adopt the
        // refined state so the caller can write it back.
        if let Some(blob) = response.conditioning_base64 {
            *conditioning = Self::decode_conditioning(&blob).map_err(Error::GenerationFailed)?;
        }

        response
            .tokens
            .ok_or_else(|| Error::GenerationFailed("no tokens in worker reply".to_string()))
    }

    fn synthesize(&mut self, tokens: &[i64], conditioning: &VoiceConditioning) -> Result<Vec<f32>> {
        let request = WorkerRequest {
            tokens: Some(tokens),
            conditioning_base64: Some(Self::encode_conditioning(conditioning)),
            ..WorkerRequest::new("synthesize")
        };

        let response = self.call(&request).map_err(Error::GenerationFailed)?;
        let audio_b64 = response
            .audio_base64
            .ok_or_else(|| Error::GenerationFailed("no audio in worker reply".to_string()))?;

        let wav_bytes = base64::engine::general_purpose::STANDARD
            .decode(&audio_b64)
            .map_err(|e| Error::GenerationFailed(format!("bad audio from worker: {}", e)))?;

        let samples = audio::decode_wav_samples(&wav_bytes)?;
        debug!("Worker returned {} samples", samples.len());
        Ok(samples)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        // Only tear down a worker we spawned ourselves; an externally
        // managed daemon keeps running.
        if let Some(mut child) = self.daemon.take() {
            let shutdown = WorkerRequest::new("shutdown");
            if let Ok(mut stream) = self.connect() {
                if let Ok(payload) = serde_json::to_vec(&shutdown) {
                    let _ = stream.write_all(&(payload.len() as u32).to_be_bytes());
                    let _ = stream.write_all(&payload);
                }
            }
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
