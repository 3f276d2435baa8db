//! Byte mirroring and pipeline feeding for one observed connection.
//!
//! Every chunk read from a direction's input is written to the opposite
//! output *before* it is parsed, so mirroring never waits on (or fails
//! with) the analysis. Events are published on an unbounded channel:
//! emission is a non-blocking append, and a dropped receiver quietly stops
//! the reporting while the forwarding keeps running.

use std::process::ExitStatus;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use lspmitm::{FrameError, Pipeline, PipelineEvent, Sender, TypedMessage};

use crate::TapError;

const CHUNK_SIZE_BYTES: usize = 8192;

/// An observation produced by the tap, tagged with the side it came from.
#[derive(Debug)]
pub enum TapEvent {
    /// A classified message from either direction.
    Message(TypedMessage),
    /// A recoverable framing error on one direction.
    FrameError { sender: Sender, error: FrameError },
    /// The observed server process exited.
    ServerExit(ExitStatus),
}

fn publish(events: &mpsc::UnboundedSender<TapEvent>, sender: Sender, batch: Vec<PipelineEvent>) {
    for event in batch {
        let tap_event = match event {
            PipelineEvent::Message(message) => TapEvent::Message(message),
            PipelineEvent::FrameError(error) => TapEvent::FrameError { sender, error },
        };
        // Observers are optional; forwarding must not depend on them.
        let _ = events.send(tap_event);
    }
}

/// Drives one direction until its input reaches EOF: read a chunk, forward
/// it verbatim, then feed it through the pipeline.
pub async fn run_direction<R, W>(
    mut pipeline: Pipeline,
    mut input: R,
    mut output: W,
    events: mpsc::UnboundedSender<TapEvent>,
) -> Result<(), TapError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let sender = pipeline.sender();
    let mut chunk = [0u8; CHUNK_SIZE_BYTES];
    loop {
        let n = input.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        output.write_all(&chunk[..n]).await?;
        output.flush().await?;
        publish(&events, sender, pipeline.push(&chunk[..n]));
    }

    publish(&events, sender, pipeline.finish());
    debug!(%sender, "direction reached end of stream");
    // Propagate the EOF downstream; the peer may already be gone.
    let _ = output.shutdown().await;
    Ok(())
}

/// Runs both directions of a connection until each input reaches EOF.
///
/// `client_in`/`server_in` carry the bytes arriving from each side;
/// `server_out`/`client_out` receive the mirrored bytes for the opposite
/// side. The two directions share only the correlation registry.
pub async fn run_tap<CI, SO, SI, CO>(
    client_in: CI,
    server_out: SO,
    server_in: SI,
    client_out: CO,
    events: mpsc::UnboundedSender<TapEvent>,
) -> Result<(), TapError>
where
    CI: AsyncRead + Unpin,
    SO: AsyncWrite + Unpin,
    SI: AsyncRead + Unpin,
    CO: AsyncWrite + Unpin,
{
    let (client_pipeline, server_pipeline) = Pipeline::pair();
    let (client_result, server_result) = tokio::join!(
        run_direction(client_pipeline, client_in, server_out, events.clone()),
        run_direction(server_pipeline, server_in, client_out, events),
    );
    client_result?;
    server_result?;
    Ok(())
}
