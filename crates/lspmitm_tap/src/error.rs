use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur while running the stdio tap around a server
/// process.
#[derive(Debug, Error)]
pub enum TapError {
    #[error("server binary `{binary}` could not be spawned: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for server process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
    #[error("server stdin unavailable")]
    StdinUnavailable,
    #[error("server stdout unavailable")]
    StdoutUnavailable,
    #[error("server stderr unavailable")]
    StderrUnavailable,
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to join tap task: {0}")]
    Join(#[from] tokio::task::JoinError),
}
