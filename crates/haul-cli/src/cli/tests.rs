use super::*;
use clap::Parser;

fn parse(args: &[&str]) -> CliCommand {
    Cli::try_parse_from(args).unwrap().command
}

#[test]
fn cli_parse_run() {
    match parse(&["haul", "run"]) {
        CliCommand::Run { download_root } => assert!(download_root.is_none()),
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_download_root() {
    match parse(&["haul", "run", "--download-root", "/tmp/dl"]) {
        CliCommand::Run { download_root } => {
            assert_eq!(download_root.as_deref(), Some(std::path::Path::new("/tmp/dl")));
        }
        _ => panic!("expected Run with --download-root"),
    }
}

#[test]
fn cli_parse_add_minimal() {
    match parse(&["haul", "add", "https://example.com/file.iso"]) {
        CliCommand::Add { url, folder, filename } => {
            assert_eq!(url, "https://example.com/file.iso");
            assert!(folder.is_none());
            assert!(filename.is_none());
        }
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_add_with_folder_and_filename() {
    match parse(&[
        "haul",
        "add",
        "https://example.com/a",
        "--folder",
        "movies",
        "--filename",
        "out.bin",
    ]) {
        CliCommand::Add { url, folder, filename } => {
            assert_eq!(url, "https://example.com/a");
            assert_eq!(folder.as_deref(), Some("movies"));
            assert_eq!(filename.as_deref(), Some("out.bin"));
        }
        _ => panic!("expected Add with folder/filename"),
    }
}

#[test]
fn cli_parse_pause() {
    match parse(&["haul", "pause", "abc-123"]) {
        CliCommand::Pause { id } => assert_eq!(id, "abc-123"),
        _ => panic!("expected Pause"),
    }
}

#[test]
fn cli_parse_resume() {
    match parse(&["haul", "resume", "abc-123"]) {
        CliCommand::Resume { id } => assert_eq!(id, "abc-123"),
        _ => panic!("expected Resume"),
    }
}

#[test]
fn cli_parse_cancel_default_is_unset() {
    match parse(&["haul", "cancel", "abc-123"]) {
        CliCommand::Cancel { id, delete_file, keep_file } => {
            assert_eq!(id, "abc-123");
            assert!(!delete_file);
            assert!(!keep_file);
        }
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_cancel_delete_file() {
    match parse(&["haul", "cancel", "abc-123", "--delete-file"]) {
        CliCommand::Cancel { delete_file, keep_file, .. } => {
            assert!(delete_file);
            assert!(!keep_file);
        }
        _ => panic!("expected Cancel with --delete-file"),
    }
}

#[test]
fn cli_parse_cancel_keep_file() {
    match parse(&["haul", "cancel", "abc-123", "--keep-file"]) {
        CliCommand::Cancel { delete_file, keep_file, .. } => {
            assert!(!delete_file);
            assert!(keep_file);
        }
        _ => panic!("expected Cancel with --keep-file"),
    }
}

#[test]
fn cli_parse_cancel_conflicting_flags_rejected() {
    let result = Cli::try_parse_from(["haul", "cancel", "abc-123", "--delete-file", "--keep-file"]);
    assert!(result.is_err());
}

#[test]
fn cli_parse_pause_all() {
    assert!(matches!(parse(&["haul", "pause-all"]), CliCommand::PauseAll));
}

#[test]
fn cli_parse_resume_all() {
    assert!(matches!(parse(&["haul", "resume-all"]), CliCommand::ResumeAll));
}

#[test]
fn cli_parse_status() {
    assert!(matches!(parse(&["haul", "status"]), CliCommand::Status));
}

#[test]
fn cli_parse_set_rate_limit() {
    match parse(&["haul", "set-rate-limit", "500000"]) {
        CliCommand::SetRateLimit { bps } => assert_eq!(bps, 500_000),
        _ => panic!("expected SetRateLimit"),
    }
}

#[test]
fn cli_parse_get_setting() {
    match parse(&["haul", "get-setting", "max_concurrent_downloads"]) {
        CliCommand::GetSetting { key } => assert_eq!(key, "max_concurrent_downloads"),
        _ => panic!("expected GetSetting"),
    }
}

#[test]
fn cli_parse_set_setting() {
    match parse(&["haul", "set-setting", "max_concurrent_downloads", "8"]) {
        CliCommand::SetSetting { key, value } => {
            assert_eq!(key, "max_concurrent_downloads");
            assert_eq!(value, "8");
        }
        _ => panic!("expected SetSetting"),
    }
}

#[test]
fn cli_parse_global_socket_flag() {
    let cli = Cli::try_parse_from(["haul", "--socket", "/tmp/haul.sock", "status"]).unwrap();
    assert_eq!(cli.socket.as_deref(), Some(std::path::Path::new("/tmp/haul.sock")));
    assert!(matches!(cli.command, CliCommand::Status));
}
