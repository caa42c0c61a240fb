//! `haul resume-all` – clear the global-pause flag and ungate admission (§4.D).

use std::path::Path;

use anyhow::Result;
use haul_core::ipc::{self, Request};

use super::super::ok_or_bail;

pub async fn run_resume_all(socket: &Path) -> Result<()> {
    let response = ipc::send_request(socket, &Request::ResumeAll).await?;
    ok_or_bail(response, || println!("resumed all downloads"))
}
