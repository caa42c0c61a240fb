//! Per-download cancel/pause tokens (§4.D, §5, §9).
//!
//! Generalizes the teacher's abort-only `JobControl` to the two cooperative
//! signals this engine's workers need: `cancel` (irreversible, observed at a
//! chunk boundary or the pause wait) and `pause` (the worker spins at the
//! pause wait until cleared or cancelled). The registry is keyed by download
//! id and shared between the scheduler (which sets tokens) and workers
//! (which poll them).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::download::DownloadId;

/// Cooperative cancel/pause signal handed to a running worker.
#[derive(Clone)]
pub struct ControlToken {
    cancelled: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl ControlToken {
    fn new() -> Self {
        ControlToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn unpause(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }
}

/// Shared registry of download id -> control token. One entry exists for as
/// long as a worker for that download is registered (roughly: from admission
/// to terminal status).
#[derive(Default)]
pub struct JobControl {
    tokens: RwLock<HashMap<DownloadId, ControlToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a download about to start; returns the token its worker polls.
    pub fn register(&self, id: &DownloadId) -> ControlToken {
        let token = ControlToken::new();
        self.tokens.write().unwrap().insert(id.clone(), token.clone());
        token
    }

    /// Drop the token for a finished/removed download.
    pub fn unregister(&self, id: &DownloadId) {
        self.tokens.write().unwrap().remove(id);
    }

    pub fn request_cancel(&self, id: &DownloadId) {
        if let Some(t) = self.tokens.read().unwrap().get(id) {
            t.cancel();
        }
    }

    pub fn request_pause(&self, id: &DownloadId) {
        if let Some(t) = self.tokens.read().unwrap().get(id) {
            t.pause();
        }
    }

    pub fn request_unpause(&self, id: &DownloadId) {
        if let Some(t) = self.tokens.read().unwrap().get(id) {
            t.unpause();
        }
    }
}
