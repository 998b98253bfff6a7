//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds a voice session may stay idle before it expires.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Maximum number of live voice sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Path to the Python model worker script.
    #[serde(default = "default_worker_script")]
    pub worker_script: PathBuf,

    /// Unix socket the worker daemon listens on.
    #[serde(default = "default_worker_socket")]
    pub worker_socket: PathBuf,

    /// Python interpreter used to start the worker.
    #[serde(default = "default_python_cmd")]
    pub python_cmd: String,
}

impl EngineConfig {
    /// Build a configuration from `FALANTE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            session_ttl_secs: env_parse("FALANTE_SESSION_TTL_SECS", default_session_ttl_secs()),
            max_sessions: env_parse("FALANTE_MAX_SESSIONS", default_max_sessions()),
            worker_script: std::env::var("FALANTE_WORKER_SCRIPT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_worker_script()),
            worker_socket: std::env::var("FALANTE_WORKER_SOCKET")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_worker_socket()),
            python_cmd: std::env::var("FALANTE_PYTHON")
                .unwrap_or_else(|_| default_python_cmd()),
        }
    }

    /// Session time-to-live as a [`Duration`].
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
            worker_script: default_worker_script(),
            worker_socket: default_worker_socket(),
            python_cmd: default_python_cmd(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    900
}

fn default_max_sessions() -> usize {
    32
}

fn default_worker_script() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("scripts/chatterbox_worker.py")
}

fn default_worker_socket() -> PathBuf {
    PathBuf::from("/tmp/falante_worker.sock")
}

fn default_python_cmd() -> String {
    "python3".to_string()
}

/// Parse an environment variable, warning and falling back on bad values.
pub fn env_parse<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid {}='{}', falling back to {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
