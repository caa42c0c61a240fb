//! `haul run` – run the engine in the foreground: bootstrap the Scheduler
//! from the Store and serve the command socket until the process exits (§4.D, §6).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use haul_core::config::EngineConfig;
use haul_core::ipc;
use haul_core::rate_limiter::RateLimiter;
use haul_core::scheduler::Scheduler;
use haul_core::store::Store;

pub async fn run_engine(cfg: &EngineConfig, download_root: Option<PathBuf>, socket: &Path) -> Result<()> {
    let download_root = download_root.unwrap_or_else(|| cfg.download_root.clone());
    std::fs::create_dir_all(&download_root)?;

    let store = Store::open_default().await?;
    let rate_limiter = Arc::new(RateLimiter::new(0));
    let scheduler = Scheduler::new(store, rate_limiter, download_root.clone());
    scheduler.bootstrap().await?;

    tracing::info!(root = %download_root.display(), socket = %socket.display(), "haul engine starting");
    ipc::serve(scheduler, socket).await
}
