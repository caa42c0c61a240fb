//! Integration tests for the Transfer Worker against a local HTTP stub
//! (resume across restart, servers that ignore `Range`, error statuses,
//! cancellation mid-transfer — §4.C, §8).

#[path = "common/range_server.rs"]
mod range_server;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use haul_core::control::JobControl;
use haul_core::download::Progress;
use haul_core::rate_limiter::RateLimiter;
use haul_core::store::Store;
use haul_core::worker::{run_transfer, TransferOutcome, WorkerContext};

fn test_ctx(
    id: &str,
    url: String,
    target_path: std::path::PathBuf,
    store: Store,
    control: haul_core::control::ControlToken,
) -> WorkerContext {
    WorkerContext {
        id: id.to_string(),
        url,
        target_path,
        control,
        rate_limiter: Arc::new(RateLimiter::new(0)),
        progress: Arc::new(Mutex::new(Progress::default())),
        store,
    }
}

#[tokio::test]
async fn fresh_download_completes() {
    let body = b"hello world, this is a test body".to_vec();
    let base = range_server::start(body.clone());
    let url = format!("{base}file.bin");

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("file.bin");
    let store = Store::open_in_memory().await.unwrap();
    let job_control = JobControl::new();
    let control = job_control.register(&"test".to_string());

    let ctx = test_ctx("test", url, target.clone(), store, control);
    let outcome = tokio::task::spawn_blocking(move || run_transfer(&ctx)).await.unwrap();
    assert!(matches!(outcome, TransferOutcome::Completed));
    assert_eq!(std::fs::read(&target).unwrap(), body);
}

#[tokio::test]
async fn resumes_partial_file_with_range() {
    let body = b"0123456789ABCDEFGHIJ".to_vec();
    let base = range_server::start(body.clone());
    let url = format!("{base}file.bin");

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("file.bin");
    std::fs::write(&target, &body[..10]).unwrap();

    let store = Store::open_in_memory().await.unwrap();
    let job_control = JobControl::new();
    let control = job_control.register(&"test".to_string());
    let ctx = test_ctx("test", url, target.clone(), store, control);
    let outcome = tokio::task::spawn_blocking(move || run_transfer(&ctx)).await.unwrap();
    assert!(matches!(outcome, TransferOutcome::Completed));
    assert_eq!(std::fs::read(&target).unwrap(), body);
}

#[tokio::test]
async fn falls_back_to_full_redownload_when_server_ignores_range() {
    let body = b"abcdefghijklmnopqrstuvwxyz".to_vec();
    let opts = range_server::RangeServerOptions {
        support_ranges: false,
        ..Default::default()
    };
    let base = range_server::start_with_options(body.clone(), opts);
    let url = format!("{base}file.bin");

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("file.bin");
    std::fs::write(&target, b"garbage---").unwrap();

    let store = Store::open_in_memory().await.unwrap();
    let job_control = JobControl::new();
    let control = job_control.register(&"test".to_string());
    let ctx = test_ctx("test", url, target.clone(), store, control);
    let outcome = tokio::task::spawn_blocking(move || run_transfer(&ctx)).await.unwrap();
    assert!(matches!(outcome, TransferOutcome::Completed));
    assert_eq!(std::fs::read(&target).unwrap(), body);
}

#[tokio::test]
async fn http_error_status_fails_the_download() {
    let base = range_server::start_status(404);
    let url = format!("{base}missing.bin");

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing.bin");
    let store = Store::open_in_memory().await.unwrap();
    let job_control = JobControl::new();
    let control = job_control.register(&"test".to_string());
    let ctx = test_ctx("test", url, target, store, control);
    let outcome = tokio::task::spawn_blocking(move || run_transfer(&ctx)).await.unwrap();
    match outcome {
        TransferOutcome::Failed(msg) => assert!(msg.contains("404")),
        _ => panic!("expected Failed"),
    }
}

#[tokio::test]
async fn cancellation_mid_transfer_is_reported_as_cancelled() {
    let body = vec![b'x'; 20_000_000];
    let base = range_server::start(body);
    let url = format!("{base}file.bin");

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("file.bin");
    let store = Store::open_in_memory().await.unwrap();
    let job_control = Arc::new(JobControl::new());
    let control = job_control.register(&"test".to_string());

    let cancel_job_control = Arc::clone(&job_control);
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        cancel_job_control.request_cancel(&"test".to_string());
    });

    let ctx = test_ctx("test", url, target, store, control);
    let outcome = tokio::task::spawn_blocking(move || run_transfer(&ctx)).await.unwrap();
    assert!(matches!(outcome, TransferOutcome::Cancelled));
}
