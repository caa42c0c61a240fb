//! Command surface over a Unix domain socket (§6).
//!
//! One JSON value per line in, one JSON value per line out — the same
//! newline-delimited framing the teacher's `control_socket` module uses for
//! its `"pause <id>"`/`"cancel <id>"` protocol, generalized here from a
//! fire-and-forget text command to a full request/response envelope since
//! this engine's commands need return values (`add` returns an id;
//! `get-snapshot` returns the array).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::download::DownloadView;
use crate::error::EngineError;
use crate::scheduler::{PublishFrame, Scheduler};

/// One line of input on the command socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Request {
    Add { url: String, folder: Option<String>, filename: Option<String> },
    Pause { id: String },
    Resume { id: String },
    Cancel { id: String, delete_file: Option<bool> },
    PauseAll,
    ResumeAll,
    GetSnapshot,
    GetSetting { key: String },
    SetSetting { key: String, value: String },
    Subscribe,
}

/// One line of output on the command socket. A single struct rather than a
/// tagged enum so the wire shape stays simple: `ok` discriminates success
/// from failure, and the remaining fields are populated per command (§6:
/// "success with an optional result or a typed error").
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub downloads: Option<Vec<DownloadView>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<String>,
}

impl Response {
    fn ok() -> Response {
        Response { ok: true, id: None, downloads: None, value: None, error: None, kind: None }
    }

    fn with_id(id: String) -> Response {
        Response { id: Some(id), ..Response::ok() }
    }

    fn with_snapshot(downloads: Vec<DownloadView>) -> Response {
        Response { downloads: Some(downloads), ..Response::ok() }
    }

    fn with_setting(value: Option<String>) -> Response {
        Response { value, ..Response::ok() }
    }

    fn error(error: String, kind: String) -> Response {
        Response { ok: false, id: None, downloads: None, value: None, error: Some(error), kind: Some(kind) }
    }

    fn from_result<T>(result: Result<T, EngineError>, on_ok: impl FnOnce(T) -> Response) -> Response {
        match result {
            Ok(v) => on_ok(v),
            Err(e) => Response::error(e.to_string(), e.kind().to_string()),
        }
    }
}

/// Binds `socket_path` and serves the command surface until the process
/// exits. Each connection is handled on its own task.
pub async fn serve(scheduler: Arc<Scheduler>, socket_path: &Path) -> Result<()> {
    let _ = std::fs::remove_file(socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "ipc socket listening");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(scheduler, stream).await {
                        tracing::debug!("ipc connection ended: {}", e);
                    }
                });
            }
            Err(e) => tracing::warn!("ipc accept failed: {}", e),
        }
    }
}

async fn handle_connection(scheduler: Arc<Scheduler>, stream: UnixStream) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                write_line(
                    &mut write_half,
                    &Response::error(format!("malformed request: {e}"), "validation".to_string()),
                )
                .await?;
                continue;
            }
        };

        if matches!(request, Request::Subscribe) {
            return subscribe_loop(&scheduler, &mut write_half).await;
        }

        let response = dispatch(&scheduler, request).await;
        write_line(&mut write_half, &response).await?;
    }
    Ok(())
}

async fn dispatch(scheduler: &Arc<Scheduler>, request: Request) -> Response {
    match request {
        Request::Add { url, folder, filename } => {
            Response::from_result(scheduler.add(url, folder, filename).await, Response::with_id)
        }
        Request::Pause { id } => Response::from_result(scheduler.pause(&id).await, |_| Response::ok()),
        Request::Resume { id } => Response::from_result(scheduler.resume(&id).await, |_| Response::ok()),
        Request::Cancel { id, delete_file } => {
            Response::from_result(scheduler.cancel(&id, delete_file).await, |_| Response::ok())
        }
        Request::PauseAll => Response::from_result(scheduler.pause_all().await, |_| Response::ok()),
        Request::ResumeAll => Response::from_result(scheduler.resume_all().await, |_| Response::ok()),
        Request::GetSnapshot => Response::with_snapshot(scheduler.snapshot()),
        Request::GetSetting { key } => {
            Response::from_result(scheduler.get_setting(&key).await, Response::with_setting)
        }
        Request::SetSetting { key, value } => {
            Response::from_result(scheduler.set_setting(&key, &value).await, |_| Response::ok())
        }
        Request::Subscribe => unreachable!("handled by caller before dispatch"),
    }
}

/// Switches a connection into push mode: sends an immediate snapshot, then
/// forwards every subsequent publisher frame at ~1 Hz until the subscriber
/// disconnects or lags enough to be dropped (§4.E, §6).
async fn subscribe_loop(scheduler: &Arc<Scheduler>, write_half: &mut (impl AsyncWriteExt + Unpin)) -> Result<()> {
    let mut rx = scheduler.subscribe();
    let initial = PublishFrame::Status { downloads: scheduler.snapshot() };
    write_line(write_half, &initial).await?;

    loop {
        match rx.recv().await {
            Ok(frame) => {
                if write_line(write_half, &frame).await.is_err() {
                    return Ok(());
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_line(write_half: &mut (impl AsyncWriteExt + Unpin), value: &impl Serialize) -> Result<()> {
    let mut encoded = serde_json::to_string(value)?;
    encoded.push('\n');
    write_half.write_all(encoded.as_bytes()).await?;
    Ok(())
}

/// Connects to an already-running engine's socket and sends one request,
/// returning its single-line response. Used by the CLI front end for
/// one-shot commands (`add`, `pause`, `resume`, ...).
pub async fn send_request(socket_path: &Path, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket_path).await?;
    let (read_half, mut write_half) = stream.into_split();
    write_line(&mut write_half, request).await?;

    let mut lines = BufReader::new(read_half).lines();
    match lines.next_line().await? {
        Some(line) => Ok(serde_json::from_str(&line)?),
        None => anyhow::bail!("engine closed the connection without a response"),
    }
}

pub fn default_socket_path() -> Result<PathBuf> {
    crate::config::default_socket_path()
}
