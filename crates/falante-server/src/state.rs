//! Shared application state.

use std::sync::Arc;

use falante_core::{config::env_parse, TtsEngine};
use tokio::sync::Semaphore;

/// State shared across handlers: the engine plus request backpressure.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TtsEngine>,
    /// Bounds the number of requests waiting on the model at once.
    pub request_semaphore: Arc<Semaphore>,
    /// Caller-visible bound on a single request (seconds).
    pub request_timeout_secs: u64,
}

impl AppState {
    pub fn new(engine: TtsEngine) -> Self {
        let max_concurrent = env_parse("FALANTE_MAX_CONCURRENT", 8usize);
        let timeout = env_parse("FALANTE_REQUEST_TIMEOUT_SECS", 300u64);

        Self {
            engine: Arc::new(engine),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            request_timeout_secs: timeout,
        }
    }

    pub async fn acquire_permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.request_semaphore
            .acquire()
            .await
            .expect("semaphore should never be closed")
    }
}
