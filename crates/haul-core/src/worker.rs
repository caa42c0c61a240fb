//! Transfer Worker: drives one HTTP GET with `Range` resume to a terminal
//! state, honoring pause and cancel (§4.C).
//!
//! Implemented as a blocking function built on a `curl::easy::Easy` handle —
//! the same shape as the teacher's `downloader::single::download_single` —
//! invoked from the async Scheduler via `tokio::task::spawn_blocking`.
//! Periodic progress flushes to the Store (an async `sqlx` call) are made by
//! blocking on the current Tokio runtime handle from this dedicated blocking
//! thread, which is safe precisely because it is not the async reactor
//! thread.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::control::ControlToken;
use crate::download::{unix_timestamp, DownloadStatus, Progress};
use crate::rate_limiter::RateLimiter;
use crate::storage::{StorageWriter, StorageWriterBuilder};
use crate::store::Store;

/// Idle-read timeout (§4.C step 4, §5): abort if throughput drops below
/// `LOW_SPEED_BYTES_PER_SEC` for this many seconds. No total-request timeout
/// is set — downloads may be arbitrarily long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const LOW_SPEED_BYTES_PER_SEC: u32 = 1;

/// How often the Worker flushes progress to the Store while streaming
/// (§4.C step 7).
const STORE_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// How long the Worker sleeps between pause-wait rechecks (§4.C step 7).
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything one Worker invocation needs; handed in by the Scheduler when a
/// download is admitted.
pub struct WorkerContext {
    pub id: String,
    pub url: String,
    pub target_path: PathBuf,
    pub control: ControlToken,
    pub rate_limiter: Arc<RateLimiter>,
    pub progress: Arc<Mutex<Progress>>,
    pub store: Store,
}

/// Outcome the Scheduler needs to decide what happens next. Cancellation is
/// reported so the Scheduler can remove the row without the Worker racing it
/// (§5: "`cancel` observed by an in-flight Worker causes it to exit without
/// further Store writes for that row").
pub enum TransferOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Runs one download to completion, failure, or cancellation. Blocking: must
/// be invoked from `tokio::task::spawn_blocking`.
pub fn run_transfer(ctx: &WorkerContext) -> TransferOutcome {
    {
        let mut p = ctx.progress.lock().unwrap();
        p.status = DownloadStatus::Downloading;
    }
    flush(ctx, DownloadStatus::Downloading, None, None);

    if let Some(parent) = ctx.target_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return finish_failed(ctx, format!("failed to create folder: {e}"));
        }
    }

    let resume_offset = match StorageWriterBuilder::open(&ctx.target_path) {
        Ok(b) => b,
        Err(e) => return finish_failed(ctx, format!("failed to open destination file: {e}")),
    };
    let resume_offset = resume_offset.resume_offset();
    {
        let mut p = ctx.progress.lock().unwrap();
        p.downloaded_bytes = resume_offset;
    }

    match perform_get(ctx, resume_offset) {
        Ok(()) => {
            let mut p = ctx.progress.lock().unwrap();
            p.status = DownloadStatus::Completed;
            p.speed_bps = 0;
            p.eta_seconds = 0;
            p.completed_at = Some(unix_timestamp());
            let completed_at = p.completed_at;
            drop(p);
            flush(ctx, DownloadStatus::Completed, None, completed_at);
            TransferOutcome::Completed
        }
        Err(TransferError::Cancelled) => TransferOutcome::Cancelled,
        Err(TransferError::Failed(msg)) => finish_failed(ctx, msg),
    }
}

fn finish_failed(ctx: &WorkerContext, message: String) -> TransferOutcome {
    {
        let mut p = ctx.progress.lock().unwrap();
        p.status = DownloadStatus::Failed;
        p.error_message = Some(message.clone());
        p.speed_bps = 0;
        p.eta_seconds = 0;
    }
    flush(ctx, DownloadStatus::Failed, Some(&message), None);
    TransferOutcome::Failed(message)
}

fn flush(ctx: &WorkerContext, status: DownloadStatus, error: Option<&str>, completed_at: Option<i64>) {
    let (downloaded, total) = {
        let p = ctx.progress.lock().unwrap();
        (p.downloaded_bytes, p.total_bytes)
    };
    let store = ctx.store.clone();
    let id = ctx.id.clone();
    let status = status.as_str().to_string();
    let error = error.map(|s| s.to_string());
    let result = tokio::runtime::Handle::current().block_on(async move {
        store
            .update_progress(&id, downloaded, total, &status, error.as_deref(), completed_at)
            .await
    });
    if let Err(e) = result {
        tracing::warn!(id = %ctx.id, "progress flush failed: {}", e);
    }
}

enum TransferError {
    Cancelled,
    Failed(String),
}

/// Decision made once headers are available: whether to append to the
/// existing partial file or discard it and start over (§4.C step 5).
struct Decision {
    writer: StorageWriter,
    total_bytes: u64,
}

/// Shared state the curl callbacks mutate. Single-threaded (curl invokes
/// callbacks synchronously on the calling thread during `perform`), so a
/// `RefCell` is enough — no cross-thread sharing here.
struct TransferState {
    decision: Option<Decision>,
    headers: Vec<String>,
    error_status: Option<u32>,
    io_error: Option<String>,
    cancelled_mid_write: bool,
    last_sample_time: Instant,
    last_sample_bytes: u64,
    last_flush: Instant,
}

fn perform_get(ctx: &WorkerContext, resume_offset: u64) -> Result<(), TransferError> {
    let state = RefCell::new(TransferState {
        decision: None,
        headers: Vec::new(),
        error_status: None,
        io_error: None,
        cancelled_mid_write: false,
        last_sample_time: Instant::now(),
        last_sample_bytes: resume_offset,
        last_flush: Instant::now(),
    });

    let chunk_size = ctx.rate_limiter.chunk_size();
    let mut easy = curl::easy::Easy::new();
    easy.url(&ctx.url)
        .map_err(|e| TransferError::Failed(format!("invalid URL: {e}")))?;
    easy.follow_location(true)
        .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;
    easy.max_redirections(10)
        .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;
    easy.buffer_size(chunk_size)
        .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;
    easy.low_speed_limit(LOW_SPEED_BYTES_PER_SEC)
        .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;
    easy.low_speed_time(IDLE_TIMEOUT)
        .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;
    if resume_offset > 0 {
        easy.range(&format!("{resume_offset}-"))
            .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;
    }

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = std::str::from_utf8(data) {
                    state.borrow_mut().headers.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;

        transfer
            .write_function(|data| {
                // Determine the resume decision (append vs. overwrite) lazily,
                // once headers are fully parsed — the only point where the
                // response status and `Content-Length` are both known.
                write_chunk(ctx, &state, resume_offset, data)
            })
            .map_err(|e| TransferError::Failed(format!("curl: {e}")))?;

        if let Err(e) = transfer.perform() {
            let st = state.borrow();
            if st.cancelled_mid_write {
                return Err(TransferError::Cancelled);
            }
            if let Some(code) = st.error_status {
                return Err(TransferError::Failed(format!("HTTP {code}")));
            }
            if let Some(ref msg) = st.io_error {
                return Err(TransferError::Failed(msg.clone()));
            }
            return Err(TransferError::Failed(format!("transport error: {e}")));
        }
    }

    // No body bytes ever arrived (e.g. a zero-length response): still need to
    // make the resume decision and create/truncate the destination file.
    {
        let mut st = state.borrow_mut();
        if st.decision.is_none() {
            let code = easy.response_code().unwrap_or(0);
            if !(200..300).contains(&code) {
                return Err(TransferError::Failed(format!("HTTP {code}")));
            }
            match decide(ctx, resume_offset, code, &st.headers) {
                Ok(d) => st.decision = Some(d),
                Err(msg) => return Err(TransferError::Failed(msg)),
            }
        }
    }

    let code = easy.response_code().unwrap_or(0);
    if !(200..300).contains(&code) {
        return Err(TransferError::Failed(format!("HTTP {code}")));
    }

    if let Some(d) = state.into_inner().decision {
        if let Err(e) = d.writer.sync() {
            return Err(TransferError::Failed(format!("sync failed: {e}")));
        }
    }

    Ok(())
}

fn write_chunk(ctx: &WorkerContext, state: &RefCell<TransferState>, resume_offset: u64, data: &[u8]) -> Result<usize, curl::easy::WriteError> {
    // The decision (append/overwrite, total size) is made on first callback,
    // since curl has fully parsed the response headers by the time
    // `write_function` is first invoked.
    {
        let needs_decision = state.borrow().decision.is_none();
        if needs_decision {
            let code = {
                // We don't have direct access to `easy` here (borrowed
                // mutably by `transfer`), so the status line is read back out
                // of the collected header lines instead.
                let st = state.borrow();
                status_code_from_headers(&st.headers).unwrap_or(0)
            };
            if code >= 400 {
                state.borrow_mut().error_status = Some(code);
                return Ok(0);
            }
            let headers = state.borrow().headers.clone();
            match decide(ctx, resume_offset, code, &headers) {
                Ok(d) => state.borrow_mut().decision = Some(d),
                Err(msg) => {
                    state.borrow_mut().io_error = Some(msg);
                    return Ok(0);
                }
            }
        }
    }

    if state.borrow().error_status.is_some() {
        return Ok(0);
    }

    if ctx.control.is_cancelled() {
        state.borrow_mut().cancelled_mid_write = true;
        return Ok(0);
    }
    while ctx.control.is_paused() && !ctx.control.is_cancelled() {
        std::thread::sleep(PAUSE_POLL_INTERVAL);
    }
    if ctx.control.is_cancelled() {
        state.borrow_mut().cancelled_mid_write = true;
        return Ok(0);
    }

    ctx.rate_limiter.acquire(data.len() as u64);

    // Rate limiter sleeps are cancel-safe: re-check after waking (§5).
    if ctx.control.is_cancelled() {
        state.borrow_mut().cancelled_mid_write = true;
        return Ok(0);
    }

    {
        let mut st = state.borrow_mut();
        let Some(decision) = st.decision.as_mut() else {
            return Ok(0);
        };
        if let Err(e) = decision.writer.write_chunk(data) {
            st.io_error = Some(e.to_string());
            return Ok(0);
        }
    }

    let mut p = ctx.progress.lock().unwrap();
    p.downloaded_bytes += data.len() as u64;
    let (downloaded, total) = (p.downloaded_bytes, p.total_bytes);
    drop(p);

    let mut st = state.borrow_mut();
    let now = Instant::now();
    let dt = now.duration_since(st.last_sample_time);
    if dt >= Duration::from_secs(1) {
        let delta_bytes = downloaded.saturating_sub(st.last_sample_bytes);
        let speed = (delta_bytes as f64 / dt.as_secs_f64()) as u64;
        let eta = if speed > 0 && total > 0 {
            (total.saturating_sub(downloaded)) / speed
        } else {
            0
        };
        let mut p = ctx.progress.lock().unwrap();
        p.speed_bps = speed;
        p.eta_seconds = eta;
        drop(p);
        st.last_sample_time = now;
        st.last_sample_bytes = downloaded;
    }

    if now.duration_since(st.last_flush) >= STORE_FLUSH_INTERVAL {
        st.last_flush = now;
        drop(st);
        flush(ctx, DownloadStatus::Downloading, None, None);
    }

    Ok(data.len())
}

/// Makes the append-vs-overwrite call and opens the destination file
/// accordingly (§4.C steps 5-6).
fn decide(ctx: &WorkerContext, resume_offset: u64, code: u32, headers: &[String]) -> Result<Decision, String> {
    let content_length = content_length_from_headers(headers);
    let builder = StorageWriterBuilder::open(&ctx.target_path).map_err(|e| e.to_string())?;

    if resume_offset > 0 && code != 206 {
        // Server ignored our Range request: discard the partial and start
        // over from byte 0.
        let mut writer = builder.build().map_err(|e| e.to_string())?;
        writer.truncate_and_restart().map_err(|e| e.to_string())?;
        let mut p = ctx.progress.lock().unwrap();
        p.downloaded_bytes = 0;
        p.total_bytes = content_length.unwrap_or(0);
        Ok(Decision {
            writer,
            total_bytes: content_length.unwrap_or(0),
        })
    } else {
        let writer = builder.build().map_err(|e| e.to_string())?;
        let total_bytes = if code == 206 {
            content_length.map(|n| resume_offset + n).unwrap_or(0)
        } else {
            content_length.unwrap_or(0)
        };
        let mut p = ctx.progress.lock().unwrap();
        p.total_bytes = total_bytes;
        Ok(Decision { writer, total_bytes })
    }
}

fn status_code_from_headers(headers: &[String]) -> Option<u32> {
    // The status line ("HTTP/1.1 206 Partial Content") is always the first
    // header line curl hands to `header_function` for the final response
    // (redirects are followed internally, so earlier status lines are
    // already consumed by the time the body callback fires).
    for line in headers.iter().rev() {
        if let Some(rest) = line.strip_prefix("HTTP/") {
            if let Some(code_str) = rest.split_whitespace().nth(1) {
                if let Ok(code) = code_str.parse() {
                    return Some(code);
                }
            }
        }
    }
    None
}

fn content_length_from_headers(headers: &[String]) -> Option<u64> {
    // With `follow_location(true)`, curl hands every redirect's headers to
    // `header_function` too, and a 301/302 commonly carries its own
    // `Content-Length`. Scope the search to the final response block (same
    // "last status line" anchor `status_code_from_headers` uses) so a
    // redirect's length is never mistaken for the real body's.
    let final_block_start = headers
        .iter()
        .rposition(|line| line.starts_with("HTTP/"))
        .map(|i| i + 1)
        .unwrap_or(0);
    for line in &headers[final_block_start..] {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.trim().parse() {
                    return Some(n);
                }
            }
        }
    }
    None
}
