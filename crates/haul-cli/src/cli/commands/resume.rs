//! `haul resume <id>` – resume a paused job, bypassing global pause (§4.D).

use std::path::Path;

use anyhow::Result;
use haul_core::ipc::{self, Request};

use super::super::ok_or_bail;

pub async fn run_resume(socket: &Path, id: String) -> Result<()> {
    let response = ipc::send_request(socket, &Request::Resume { id: id.clone() }).await?;
    ok_or_bail(response, || println!("resumed {id}"))
}
