//! `haul pause-all` – set the global-pause flag (§4.D).

use std::path::Path;

use anyhow::Result;
use haul_core::ipc::{self, Request};

use super::super::ok_or_bail;

pub async fn run_pause_all(socket: &Path) -> Result<()> {
    let response = ipc::send_request(socket, &Request::PauseAll).await?;
    ok_or_bail(response, || println!("paused all downloads"))
}
