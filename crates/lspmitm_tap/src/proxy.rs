//! Supervision of the observed server process.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use lspmitm::Pipeline;

use crate::tap::{run_direction, TapEvent};
use crate::TapError;

/// Spawns `binary args…` with piped stdio and taps the conversation between
/// the monitor's own stdin/stdout and the child's stdin/stdout.
///
/// Client bytes (our stdin) are forwarded to the child and parsed as the
/// Client direction; child stdout is forwarded to our stdout and parsed as
/// the Server direction; child stderr is mirrored to our stderr untouched.
/// Returns the child's exit status after the server side of the tap has
/// drained.
pub async fn run_stdio_proxy(
    binary: impl AsRef<Path>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    events: mpsc::UnboundedSender<TapEvent>,
) -> Result<ExitStatus, TapError> {
    let binary = binary.as_ref();
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| TapError::Spawn {
        binary: PathBuf::from(binary),
        source,
    })?;

    let child_stdin = child.stdin.take().ok_or(TapError::StdinUnavailable)?;
    let child_stdout = child.stdout.take().ok_or(TapError::StdoutUnavailable)?;
    let child_stderr = child.stderr.take().ok_or(TapError::StderrUnavailable)?;

    debug!(binary = %binary.display(), "observed server spawned");

    let (client_pipeline, server_pipeline) = Pipeline::pair();
    let client_task = tokio::spawn(run_direction(
        client_pipeline,
        tokio::io::stdin(),
        child_stdin,
        events.clone(),
    ));
    let server_task = tokio::spawn(run_direction(
        server_pipeline,
        child_stdout,
        tokio::io::stdout(),
        events.clone(),
    ));
    let stderr_task = tokio::spawn(mirror_stderr(child_stderr));

    let status = child
        .wait()
        .await
        .map_err(|source| TapError::Wait { source })?;
    let _ = events.send(TapEvent::ServerExit(status));

    // The server direction and the stderr mirror drain to EOF once the child
    // is gone; the client direction may be blocked on our stdin forever, so
    // it is cancelled instead.
    let server_result = server_task.await;
    let stderr_result = stderr_task.await;
    client_task.abort();
    match client_task.await {
        Ok(Ok(())) => {}
        // A write to the dead child's stdin is expected to fail.
        Ok(Err(error)) => debug!(%error, "client direction ended with error"),
        Err(join_error) if join_error.is_cancelled() => {
            debug!("client direction cancelled after server exit");
        }
        Err(join_error) => return Err(TapError::Join(join_error)),
    }
    server_result??;
    stderr_result??;

    if !status.success() {
        warn!(?status, "observed server exited with failure");
    }
    Ok(status)
}

async fn mirror_stderr<R>(mut reader: R) -> Result<(), TapError>
where
    R: AsyncRead + Unpin,
{
    let mut stderr = tokio::io::stderr();
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        stderr.write_all(&chunk[..n]).await?;
        stderr.flush().await?;
    }
}
