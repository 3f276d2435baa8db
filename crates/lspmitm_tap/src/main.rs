//! `lspmitm <server> [args…]` — observe an LSP conversation from the middle.
//!
//! The monitor sits between the editor (its own stdin/stdout) and the
//! spawned server, forwarding bytes untouched while logging every classified
//! message as one log line. Lines go to the file named by `LSPMITM_LOG`, or
//! to stderr when unset; stdout belongs to the mirrored protocol bytes.

use std::ffi::OsString;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lspmitm::{to_log_line, MessageLog};
use lspmitm_tap::{run_stdio_proxy, TapEvent};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args_os().skip(1);
    let Some(server) = args.next() else {
        eprintln!("usage: lspmitm <server> [args...]");
        std::process::exit(2);
    };
    let server_args: Vec<OsString> = args.collect();

    let log_path = std::env::var_os("LSPMITM_LOG");
    let mut log_file = match &log_path {
        Some(path) => match tokio::fs::File::create(path).await {
            Ok(file) => Some(file),
            Err(error) => {
                eprintln!("FATAL: cannot open log file {path:?}: {error}");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let consumer = tokio::spawn(async move {
        let mut log = MessageLog::new();
        while let Some(event) = events_rx.recv().await {
            match event {
                TapEvent::Message(message) => {
                    let line = to_log_line(&message);
                    match &mut log_file {
                        Some(file) => {
                            if let Err(error) = write_line(file, &line).await {
                                warn!(%error, "failed to write log line");
                            }
                        }
                        None => eprintln!("{line}"),
                    }
                    let issues = message.issue_count();
                    if issues > 0 {
                        warn!(
                            sender = %message.sender,
                            kind = message.kind.name(),
                            issues,
                            "message with schema issues"
                        );
                    } else {
                        debug!(
                            sender = %message.sender,
                            kind = message.kind.name(),
                            method = message.method().unwrap_or("-"),
                            "message"
                        );
                    }
                    log.append(message);
                }
                TapEvent::FrameError { sender, error } => warn!(
                    %sender,
                    offset = error.global_offset,
                    "framing error: {}",
                    error.kind
                ),
                TapEvent::ServerExit(status) => info!(?status, "server exited"),
            }
        }
        log
    });

    info!(server = ?server, "starting tap");
    let result = run_stdio_proxy(&server, &server_args, events_tx).await;

    let log = match consumer.await {
        Ok(log) => log,
        Err(error) => {
            eprintln!("FATAL: event consumer failed: {error}");
            std::process::exit(1);
        }
    };
    info!(messages = log.len(), "capture complete");

    match result {
        Ok(status) => std::process::exit(status.code().unwrap_or(0)),
        Err(error) => {
            eprintln!("FATAL: {error}");
            std::process::exit(1);
        }
    }
}

async fn write_line(file: &mut tokio::fs::File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}
