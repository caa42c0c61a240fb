//! `haul pause <id>` – pause a queued or downloading job.

use std::path::Path;

use anyhow::Result;
use haul_core::ipc::{self, Request};

use super::super::ok_or_bail;

pub async fn run_pause(socket: &Path, id: String) -> Result<()> {
    let response = ipc::send_request(socket, &Request::Pause { id: id.clone() }).await?;
    ok_or_bail(response, || println!("paused {id}"))
}
