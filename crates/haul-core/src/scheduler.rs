//! Scheduler: registry, admission loop, and command surface (§4.D), plus the
//! Snapshot Publisher (§4.E).
//!
//! Structurally the async counterpart of the teacher's `DownloadManager` /
//! `ddm_core::scheduler::run_jobs_parallel`: a single struct owns the
//! registry, the shared `RateLimiter`, the shared `Store`, the global-pause
//! flag, and a `JobControl`-style per-download cancel/pause registry. Callers
//! (the IPC listener, or a library consumer) drive it entirely through
//! `Arc<Scheduler>` methods — there is no actor/channel indirection, matching
//! the teacher's own direct-call-into-shared-state style.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::control::{ControlToken, JobControl};
use crate::download::{unix_timestamp, DownloadId, DownloadMeta, DownloadStatus, DownloadView, Progress};
use crate::error::{EngineError, Result};
use crate::path_safety::resolve_download_folder;
use crate::rate_limiter::RateLimiter;
use crate::store::{DownloadRow, Settings, Store};
use crate::url_model::{derive_filename, sanitize_filename_for_linux};
use crate::worker::{self, TransferOutcome, WorkerContext};

/// Frame pushed to subscribers by the periodic publisher task (§4.E, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PublishFrame {
    Status { downloads: Vec<DownloadView> },
}

/// Cadence of the periodic push snapshot.
const PUBLISH_INTERVAL: Duration = Duration::from_secs(1);
/// Cadence of the admission loop's re-check when there is no immediate trigger.
const ADMISSION_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Capacity of the broadcast channel; a slow subscriber simply lags and drops
/// frames rather than blocking the publisher (§4.E).
const PUBLISH_CHANNEL_CAPACITY: usize = 16;

struct DownloadHandle {
    meta: DownloadMeta,
    progress: Arc<Mutex<Progress>>,
    control: ControlToken,
    /// Set while a `run_transfer` task is alive for this id — from
    /// `spawn_worker` until `finalize_worker` — including the whole time it
    /// sits parked in the pause wait (§4.C). `resume` consults this so it
    /// never starts a second worker alongside one still parked from a
    /// mid-flight `pause` (§3: "at most one active Transfer Worker exists
    /// per identifier").
    worker_active: bool,
}

/// Owns the in-memory registry and drives the whole engine (§4.D).
pub struct Scheduler {
    registry: Mutex<HashMap<DownloadId, DownloadHandle>>,
    store: Store,
    rate_limiter: Arc<RateLimiter>,
    job_control: Arc<JobControl>,
    download_root: PathBuf,
    global_paused: AtomicBool,
    max_concurrent: AtomicU32,
    admission_running: AtomicBool,
    publisher: broadcast::Sender<PublishFrame>,
}

impl Scheduler {
    pub fn new(store: Store, rate_limiter: Arc<RateLimiter>, download_root: PathBuf) -> Arc<Self> {
        let (publisher, _rx) = broadcast::channel(PUBLISH_CHANNEL_CAPACITY);
        Arc::new(Scheduler {
            registry: Mutex::new(HashMap::new()),
            store,
            rate_limiter,
            job_control: Arc::new(JobControl::new()),
            download_root,
            global_paused: AtomicBool::new(false),
            max_concurrent: AtomicU32::new(Settings::default().max_concurrent_downloads),
            admission_running: AtomicBool::new(false),
            publisher,
        })
    }

    /// Startup reconstitution (§4.D): demote stale `downloading` rows,
    /// reload settings, rebuild the registry from non-terminal rows, and
    /// start the admission loop and publisher task.
    pub async fn bootstrap(self: &Arc<Self>) -> anyhow::Result<()> {
        let demoted = self.store.demote_downloading_to_queued().await?;
        if demoted > 0 {
            tracing::info!(count = demoted, "demoted stale downloading rows to queued");
        }

        let settings = self.store.get_settings().await?;
        self.rate_limiter.set_limit_bps(settings.global_rate_limit_bps);
        self.max_concurrent.store(settings.max_concurrent_downloads, Ordering::Relaxed);

        let rows = self.store.list_nonterminal().await?;
        {
            let mut registry = self.registry.lock().unwrap();
            for row in rows {
                let status = DownloadStatus::from_str(&row.status);
                let control = self.job_control.register(&row.id);
                let meta = DownloadMeta {
                    id: row.id.clone(),
                    url: row.url,
                    folder: row.folder,
                    filename: row.filename,
                    created_at: row.created_at,
                };
                let progress = Progress {
                    downloaded_bytes: row.downloaded_bytes,
                    total_bytes: row.total_bytes,
                    status,
                    error_message: row.error_message,
                    speed_bps: 0,
                    eta_seconds: 0,
                    completed_at: row.completed_at,
                };
                registry.insert(
                    row.id,
                    DownloadHandle {
                        meta,
                        progress: Arc::new(Mutex::new(progress)),
                        control,
                        worker_active: false,
                    },
                );
            }
        }

        self.ensure_admission_loop();
        self.spawn_publisher();
        Ok(())
    }

    // ---- command surface (§4.D) ----

    pub async fn add(self: &Arc<Self>, url: String, folder: Option<String>, filename: Option<String>) -> Result<DownloadId> {
        url::Url::parse(&url).map_err(|e| EngineError::Validation(format!("invalid url: {e}")))?;

        let folder = folder.unwrap_or_default();
        resolve_download_folder(&self.download_root, &folder)?;

        let filename = match filename {
            Some(f) => {
                let sanitized = sanitize_filename_for_linux(&f);
                if sanitized.is_empty() {
                    derive_filename(&url)
                } else {
                    sanitized
                }
            }
            None => derive_filename(&url),
        };

        let id = Uuid::new_v4().to_string();
        let created_at = unix_timestamp();
        let global_paused = self.global_paused.load(Ordering::Relaxed);
        let status = if global_paused { DownloadStatus::Paused } else { DownloadStatus::Queued };

        let row = DownloadRow {
            id: id.clone(),
            url: url.clone(),
            folder: folder.clone(),
            filename: filename.clone(),
            status: status.as_str().to_string(),
            downloaded_bytes: 0,
            total_bytes: 0,
            error_message: None,
            created_at,
            completed_at: None,
        };
        self.store.insert(&row).await?;

        let control = self.job_control.register(&id);
        let meta = DownloadMeta { id: id.clone(), url, folder, filename, created_at };
        let progress = Progress { status, ..Progress::default() };
        self.registry.lock().unwrap().insert(
            id.clone(),
            DownloadHandle { meta, progress: Arc::new(Mutex::new(progress)), control, worker_active: false },
        );

        self.ensure_admission_loop();
        Ok(id)
    }

    pub async fn pause(self: &Arc<Self>, id: &str) -> Result<()> {
        let current = {
            let registry = self.registry.lock().unwrap();
            let handle = registry.get(id).ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            handle.progress.lock().unwrap().status
        };
        if !matches!(current, DownloadStatus::Queued | DownloadStatus::Downloading) {
            return Err(EngineError::InvalidState(format!(
                "cannot pause download in status {}",
                current.as_str()
            )));
        }

        {
            let registry = self.registry.lock().unwrap();
            let handle = registry.get(id).unwrap();
            let mut p = handle.progress.lock().unwrap();
            p.status = DownloadStatus::Paused;
            p.speed_bps = 0;
            p.eta_seconds = 0;
        }
        self.job_control.request_pause(&id.to_string());
        self.store.set_status(id, DownloadStatus::Paused.as_str()).await?;
        Ok(())
    }

    pub async fn resume(self: &Arc<Self>, id: &str) -> Result<()> {
        let current = {
            let registry = self.registry.lock().unwrap();
            let handle = registry.get(id).ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            handle.progress.lock().unwrap().status
        };
        if current != DownloadStatus::Paused {
            return Err(EngineError::InvalidState(format!(
                "cannot resume download in status {}",
                current.as_str()
            )));
        }

        // A download paused while `downloading` still has its worker task
        // alive, parked in the pause wait (§4.C) — `pause` never stops it.
        // `request_unpause` below is enough to wake that worker; spawning a
        // second one here would race it on the same file and progress slot,
        // violating "at most one active Transfer Worker exists per
        // identifier" (§3). Only spawn fresh when no worker is running,
        // i.e. the download was paused before ever being admitted.
        let worker_already_running = {
            let registry = self.registry.lock().unwrap();
            let handle = registry.get(id).unwrap();
            handle.progress.lock().unwrap().status = DownloadStatus::Downloading;
            handle.worker_active
        };
        self.job_control.request_unpause(&id.to_string());
        self.store.set_status(id, DownloadStatus::Downloading.as_str()).await?;

        // Resuming a single item bypasses the global-pause gate and the
        // concurrency cap: it is an explicit per-item override (§4.D).
        if !worker_already_running {
            self.spawn_worker(id.to_string());
        }
        Ok(())
    }

    pub async fn cancel(&self, id: &str, delete_file: Option<bool>) -> Result<()> {
        self.job_control.request_cancel(&id.to_string());
        let removed = self.registry.lock().unwrap().remove(id);
        self.job_control.unregister(&id.to_string());

        let Some(handle) = removed else {
            return Err(EngineError::NotFound(id.to_string()));
        };

        let prior_status = handle.progress.lock().unwrap().status;
        let should_delete = delete_file.unwrap_or(prior_status != DownloadStatus::Completed);
        if should_delete {
            if let Ok(dir) = resolve_download_folder(&self.download_root, &handle.meta.folder) {
                let path = dir.join(&handle.meta.filename);
                let _ = std::fs::remove_file(path);
            }
        }

        self.store.delete(id).await?;
        Ok(())
    }

    pub async fn pause_all(self: &Arc<Self>) -> Result<()> {
        self.global_paused.store(true, Ordering::Relaxed);
        let ids: Vec<DownloadId> = {
            let registry = self.registry.lock().unwrap();
            registry
                .iter()
                .filter(|(_, h)| {
                    matches!(
                        h.progress.lock().unwrap().status,
                        DownloadStatus::Queued | DownloadStatus::Downloading
                    )
                })
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in ids {
            let _ = self.pause(&id).await;
        }
        Ok(())
    }

    pub async fn resume_all(self: &Arc<Self>) -> Result<()> {
        self.global_paused.store(false, Ordering::Relaxed);
        let ids: Vec<DownloadId> = {
            let registry = self.registry.lock().unwrap();
            registry
                .iter()
                .filter(|(_, h)| h.progress.lock().unwrap().status == DownloadStatus::Paused)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in ids {
            let registry = self.registry.lock().unwrap();
            if let Some(handle) = registry.get(&id) {
                handle.progress.lock().unwrap().status = DownloadStatus::Queued;
            }
            drop(registry);
            self.job_control.request_unpause(&id);
            let _ = self.store.set_status(&id, DownloadStatus::Queued.as_str()).await;
        }
        self.ensure_admission_loop();
        Ok(())
    }

    pub async fn set_rate_limit(&self, bps: u64) -> Result<()> {
        self.rate_limiter.set_limit_bps(bps);
        self.store.set_setting("global_rate_limit_bps", &bps.to_string()).await?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get_setting(key).await?)
    }

    pub async fn set_setting(self: &Arc<Self>, key: &str, value: &str) -> Result<()> {
        match key {
            "global_rate_limit_bps" => {
                let bps: u64 = value.parse().map_err(|_| EngineError::Validation(format!("invalid u64: {value}")))?;
                return self.set_rate_limit(bps).await;
            }
            "max_concurrent_downloads" => {
                let n: u32 = value.parse().map_err(|_| EngineError::Validation(format!("invalid u32: {value}")))?;
                if n == 0 {
                    return Err(EngineError::Validation("max_concurrent_downloads must be positive".to_string()));
                }
                self.max_concurrent.store(n, Ordering::Relaxed);
                self.ensure_admission_loop();
            }
            other => return Err(EngineError::Validation(format!("unrecognized setting: {other}"))),
        }
        self.store.set_setting(key, value).await?;
        Ok(())
    }

    /// Consistent snapshot of every known download (§4.E).
    pub fn snapshot(&self) -> Vec<DownloadView> {
        let registry = self.registry.lock().unwrap();
        let mut views: Vec<DownloadView> = registry
            .values()
            .map(|h| {
                let progress = h.progress.lock().unwrap().clone();
                DownloadView::new(&h.meta, &progress)
            })
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishFrame> {
        self.publisher.subscribe()
    }

    // ---- admission loop (§4.D) ----

    fn ensure_admission_loop(self: &Arc<Self>) {
        if self
            .admission_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move { scheduler.admission_loop().await });
        }
    }

    async fn admission_loop(self: Arc<Self>) {
        loop {
            let (active, queued_ids) = {
                let registry = self.registry.lock().unwrap();
                let active = registry
                    .values()
                    .filter(|h| h.progress.lock().unwrap().status == DownloadStatus::Downloading)
                    .count();
                let mut queued: Vec<&DownloadHandle> = registry
                    .values()
                    .filter(|h| h.progress.lock().unwrap().status == DownloadStatus::Queued)
                    .collect();
                queued.sort_by(|a, b| {
                    a.meta
                        .created_at
                        .cmp(&b.meta.created_at)
                        .then_with(|| a.meta.id.cmp(&b.meta.id))
                });
                let queued_ids: Vec<DownloadId> = queued.into_iter().map(|h| h.meta.id.clone()).collect();
                (active, queued_ids)
            };

            if !self.global_paused.load(Ordering::Relaxed) && !queued_ids.is_empty() {
                let max = self.max_concurrent.load(Ordering::Relaxed) as usize;
                let slots = max.saturating_sub(active);
                for id in queued_ids.into_iter().take(slots) {
                    {
                        let registry = self.registry.lock().unwrap();
                        if let Some(handle) = registry.get(&id) {
                            handle.progress.lock().unwrap().status = DownloadStatus::Downloading;
                        }
                    }
                    let _ = self.store.set_status(&id, DownloadStatus::Downloading.as_str()).await;
                    self.spawn_worker(id);
                }
            }

            let still_has_work = {
                let registry = self.registry.lock().unwrap();
                registry.values().any(|h| {
                    matches!(
                        h.progress.lock().unwrap().status,
                        DownloadStatus::Queued | DownloadStatus::Downloading
                    )
                })
            };
            if !still_has_work {
                self.admission_running.store(false, Ordering::Release);
                return;
            }

            tokio::time::sleep(ADMISSION_POLL_INTERVAL).await;
        }
    }

    fn spawn_worker(self: &Arc<Self>, id: DownloadId) {
        let ctx = {
            let mut registry = self.registry.lock().unwrap();
            let Some(handle) = registry.get_mut(&id) else { return };
            // Guard against ever running two `run_transfer`s for the same id
            // (§3): a caller that raced `resume` with the admission loop, or
            // called it twice, finds a worker already live and no-ops here.
            if handle.worker_active {
                return;
            }
            let Ok(dir) = resolve_download_folder(&self.download_root, &handle.meta.folder) else {
                return;
            };
            handle.worker_active = true;
            WorkerContext {
                id: id.clone(),
                url: handle.meta.url.clone(),
                target_path: dir.join(&handle.meta.filename),
                control: handle.control.clone(),
                rate_limiter: Arc::clone(&self.rate_limiter),
                progress: Arc::clone(&handle.progress),
                store: self.store.clone(),
            }
        };

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || worker::run_transfer(&ctx))
                .await
                .unwrap_or_else(|e| TransferOutcome::Failed(format!("worker task panicked: {e}")));
            scheduler.finalize_worker(&id, outcome);
        });
    }

    /// Reacts to a Worker's terminal outcome. `Completed`/`Failed` have
    /// already been persisted by the Worker itself; `Cancelled` rows were
    /// already removed synchronously by `cancel` (§4.D), so there is nothing
    /// left to do here but clear the active-worker flag (if the row is still
    /// in the registry) and drop the control token.
    fn finalize_worker(&self, id: &str, _outcome: TransferOutcome) {
        if let Some(handle) = self.registry.lock().unwrap().get_mut(id) {
            handle.worker_active = false;
        }
        self.job_control.unregister(&id.to_string());
    }

    fn spawn_publisher(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let downloads = scheduler.snapshot();
                // Zero receivers is not a fault (§4.E).
                let _ = scheduler.publisher.send(PublishFrame::Status { downloads });
                tokio::time::sleep(PUBLISH_INTERVAL).await;
            }
        });
    }
}
