//! Process configuration, loaded from (or initialized into) an XDG config
//! file (§2.1, §6), exactly as the teacher's own config module does.
//!
//! The two tunables the specification calls "settings" — `global_rate_limit_bps`
//! and `max_concurrent_downloads` — are *not* here: per §3 they are process-wide
//! state persisted in the Store's `settings` table and loaded once by the
//! Scheduler at startup. This file only carries the static placement facts the
//! store itself needs before it can be opened: where downloads land on disk,
//! where the database file lives, and where the command socket is bound.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Static engine configuration (§6: filesystem layout, command socket).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory all downloads are written under (§6).
    pub download_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            download_root: default_download_root(),
        }
    }
}

fn default_download_root() -> PathBuf {
    xdg::BaseDirectories::with_prefix("haul")
        .ok()
        .map(|dirs| dirs.get_data_home().join("downloads"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("haul")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: EngineConfig = toml::from_str(&data)?;
    Ok(cfg)
}

/// Path to the database file backing the Persistence Store (§4.A).
pub fn default_db_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("haul")?;
    let state_dir = xdg_dirs.get_state_home();
    fs::create_dir_all(&state_dir)?;
    Ok(state_dir.join("downloads.db"))
}

/// Path to the Unix domain socket serving the command surface (§6).
pub fn default_socket_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("haul")?;
    if let Ok(runtime_dir) = xdg_dirs.get_runtime_directory() {
        return Ok(runtime_dir.join("engine.sock"));
    }
    let state_dir = xdg_dirs.get_state_home();
    fs::create_dir_all(&state_dir)?;
    Ok(state_dir.join("engine.sock"))
}
