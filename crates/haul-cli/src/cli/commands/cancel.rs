//! `haul cancel <id>` – abort a job and remove its row (§4.D).

use std::path::Path;

use anyhow::Result;
use haul_core::ipc::{self, Request};

use super::super::ok_or_bail;

pub async fn run_cancel(socket: &Path, id: String, delete_file: Option<bool>) -> Result<()> {
    let response = ipc::send_request(socket, &Request::Cancel { id: id.clone(), delete_file }).await?;
    ok_or_bail(response, || println!("cancelled {id}"))
}
