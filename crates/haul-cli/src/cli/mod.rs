//! CLI for the haul download manager engine.
//!
//! `run` hosts the engine (Scheduler + Store + Rate Limiter) in the
//! foreground and serves the command socket (§6); every other subcommand is
//! a thin one-shot client that sends a single `Request` to an already
//! running engine and prints its `Response`.

mod commands;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use haul_core::config;
use haul_core::ipc::Response;

use commands::{
    run_add, run_cancel, run_engine, run_get_setting, run_pause, run_pause_all, run_resume,
    run_resume_all, run_set_rate_limit, run_set_setting, run_status,
};

/// Top-level CLI for the haul download manager engine.
#[derive(Debug, Parser)]
#[command(name = "haul")]
#[command(about = "haul: a multi-connection HTTP download manager engine", long_about = None)]
pub struct Cli {
    /// Path to the engine's command socket (default: XDG runtime/state dir).
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the engine in the foreground: bootstrap from the store and serve the command socket.
    Run {
        /// Root directory downloads are written under (default: from config).
        #[arg(long, value_name = "DIR")]
        download_root: Option<PathBuf>,
    },

    /// Add a new download.
    Add {
        /// Source URL.
        url: String,
        /// Target folder, relative to the download root.
        #[arg(long)]
        folder: Option<String>,
        /// Target filename (default: derived from the URL).
        #[arg(long)]
        filename: Option<String>,
    },

    /// Pause a queued or downloading job by id.
    Pause {
        /// Download identifier.
        id: String,
    },

    /// Resume a paused job by id, bypassing global pause.
    Resume {
        /// Download identifier.
        id: String,
    },

    /// Cancel a job by id and remove its row.
    Cancel {
        /// Download identifier.
        id: String,
        /// Delete the partial/final file on disk.
        #[arg(long, conflicts_with = "keep_file")]
        delete_file: bool,
        /// Keep the partial/final file on disk.
        #[arg(long, conflicts_with = "delete_file")]
        keep_file: bool,
    },

    /// Pause every queued or downloading job and set the global-pause flag.
    PauseAll,

    /// Clear the global-pause flag and resume every paused job.
    ResumeAll,

    /// Print a snapshot of every known download.
    Status,

    /// Set the global byte-rate cap in bytes/sec (0 = unlimited).
    SetRateLimit {
        /// Bytes per second.
        bps: u64,
    },

    /// Read a recognized setting (`global_rate_limit_bps`, `max_concurrent_downloads`).
    GetSetting {
        /// Setting key.
        key: String,
    },

    /// Write a recognized setting.
    SetSetting {
        /// Setting key.
        key: String,
        /// New value.
        value: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let socket = match cli.socket {
            Some(p) => p,
            None => config::default_socket_path()?,
        };

        match cli.command {
            CliCommand::Run { download_root } => run_engine(&cfg, download_root, &socket).await,
            CliCommand::Add { url, folder, filename } => run_add(&socket, url, folder, filename).await,
            CliCommand::Pause { id } => run_pause(&socket, id).await,
            CliCommand::Resume { id } => run_resume(&socket, id).await,
            CliCommand::Cancel { id, delete_file, keep_file } => {
                let delete = if delete_file {
                    Some(true)
                } else if keep_file {
                    Some(false)
                } else {
                    None
                };
                run_cancel(&socket, id, delete).await
            }
            CliCommand::PauseAll => run_pause_all(&socket).await,
            CliCommand::ResumeAll => run_resume_all(&socket).await,
            CliCommand::Status => run_status(&socket).await,
            CliCommand::SetRateLimit { bps } => run_set_rate_limit(&socket, bps).await,
            CliCommand::GetSetting { key } => run_get_setting(&socket, key).await,
            CliCommand::SetSetting { key, value } => run_set_setting(&socket, key, value).await,
        }
    }
}

/// Shared response handling for one-shot commands that return no payload
/// beyond success/failure: runs `on_success` and returns `Ok(())`, or
/// surfaces the engine's typed error (§7).
fn ok_or_bail(response: Response, on_success: impl FnOnce()) -> Result<()> {
    if response.ok {
        on_success();
        Ok(())
    } else {
        bail!("{} ({})", response.error.unwrap_or_default(), response.kind.unwrap_or_default());
    }
}

#[cfg(test)]
mod tests;
