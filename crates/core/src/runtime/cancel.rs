//! Per-job cancellation tokens.
//!
//! Each executing job gets a `CancelToken`. Calling `cancel()` on it signals
//! the executor to stop the current attempt at its next suspension point and
//! settle the job into `Cancelled` without further store writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// A cancellation token that can be checked by the executor loop.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks active cancellation tokens per in-flight job id.
pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new cancel token for a job.
    pub fn register(&self, job_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(job_id, token.clone());
        token
    }

    /// Cancel a running job. Returns true if a token was found.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        if let Some(token) = self.tokens.lock().get(&job_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Remove the token for a job (called once it reaches a terminal state).
    pub fn remove(&self, job_id: Uuid) {
        self.tokens.lock().remove(&job_id);
    }

    /// Check if a job is currently executing.
    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&job_id)
    }
}
