//! `haul add <url>` – add a new download job.

use std::path::Path;

use anyhow::{bail, Result};
use haul_core::ipc::{self, Request};

pub async fn run_add(socket: &Path, url: String, folder: Option<String>, filename: Option<String>) -> Result<()> {
    let response = ipc::send_request(socket, &Request::Add { url, folder, filename }).await?;
    if response.ok {
        println!("{}", response.id.unwrap_or_default());
        Ok(())
    } else {
        bail!("{} ({})", response.error.unwrap_or_default(), response.kind.unwrap_or_default());
    }
}
