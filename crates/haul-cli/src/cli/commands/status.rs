//! `haul status` – print a snapshot of every known download (§4.E).

use std::path::Path;

use anyhow::{bail, Result};
use haul_core::ipc::{self, Request};

pub async fn run_status(socket: &Path) -> Result<()> {
    let response = ipc::send_request(socket, &Request::GetSnapshot).await?;
    if !response.ok {
        bail!("{} ({})", response.error.unwrap_or_default(), response.kind.unwrap_or_default());
    }
    let downloads = response.downloads.unwrap_or_default();
    if downloads.is_empty() {
        println!("No downloads.");
        return Ok(());
    }

    println!(
        "{:<36} {:<12} {:>6} {:>10} {:>10} {}",
        "ID", "STATUS", "PCT", "SPEED", "ETA", "FILE"
    );
    for d in downloads {
        let speed = format!("{:.1} KiB/s", d.progress.speed_bps as f64 / 1024.0);
        let eta = if d.progress.eta_seconds > 0 {
            format!("{}s", d.progress.eta_seconds)
        } else {
            "-".to_string()
        };
        let file = if d.folder.is_empty() {
            d.filename.clone()
        } else {
            format!("{}/{}", d.folder, d.filename)
        };
        println!(
            "{:<36} {:<12} {:>5.1}% {:>10} {:>10} {}",
            d.id,
            d.status.as_str(),
            d.progress.percentage,
            speed,
            eta,
            file,
        );
        if let Some(err) = &d.error_message {
            println!("  error: {err}");
        }
    }
    Ok(())
}
