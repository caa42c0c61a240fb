//! `haul get-setting` / `haul set-setting` / `haul set-rate-limit` – settings CRUD (§3, §4.D).

use std::path::Path;

use anyhow::{bail, Result};
use haul_core::ipc::{self, Request};

pub async fn run_get_setting(socket: &Path, key: String) -> Result<()> {
    let response = ipc::send_request(socket, &Request::GetSetting { key }).await?;
    if !response.ok {
        bail!("{} ({})", response.error.unwrap_or_default(), response.kind.unwrap_or_default());
    }
    match response.value {
        Some(v) => println!("{v}"),
        None => println!("(unset)"),
    }
    Ok(())
}

pub async fn run_set_setting(socket: &Path, key: String, value: String) -> Result<()> {
    let response = ipc::send_request(socket, &Request::SetSetting { key: key.clone(), value: value.clone() }).await?;
    if response.ok {
        println!("{key} = {value}");
        Ok(())
    } else {
        bail!("{} ({})", response.error.unwrap_or_default(), response.kind.unwrap_or_default());
    }
}

/// Convenience wrapper named directly after the spec's `set-rate-limit(bps)` command
/// (§4.D): equivalent to `set-setting global_rate_limit_bps <bps>`.
pub async fn run_set_rate_limit(socket: &Path, bps: u64) -> Result<()> {
    run_set_setting(socket, "global_rate_limit_bps".to_string(), bps.to_string()).await
}
