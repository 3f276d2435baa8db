//! Line-oriented log format for observed messages.
//!
//! One message per line: `"<--"` (Client) or `"-->"` (Server), a space, the
//! decimal millisecond timestamp, a space, and the compact JSON of the
//! message contents.

use serde_json::Value;
use thiserror::Error;

use crate::message::{Sender, TypedMessage};

const CLIENT_ARROW: &str = "<--";
const SERVER_ARROW: &str = "-->";

/// The `(sender, timestamp, contents)` triple carried by one log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub sender: Sender,
    pub timestamp_ms: i64,
    pub contents: Value,
}

impl LogLine {
    pub fn of(message: &TypedMessage) -> Self {
        Self {
            sender: message.sender,
            timestamp_ms: message.timestamp_ms,
            contents: message.contents.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogLineError {
    #[error("log line missing direction arrow")]
    MissingArrow,
    #[error("log line missing timestamp")]
    MissingTimestamp,
    #[error("log line timestamp is not an integer: `{value}`")]
    BadTimestamp { value: String },
    #[error("log line contents are not valid JSON: {source}")]
    BadContents {
        #[source]
        source: serde_json::Error,
    },
}

/// Renders one message as a log line (no trailing newline).
pub fn to_log_line(message: &TypedMessage) -> String {
    let arrow = match message.sender {
        Sender::Client => CLIENT_ARROW,
        Sender::Server => SERVER_ARROW,
    };
    format!("{arrow} {} {}", message.timestamp_ms, message.contents)
}

/// Parses one log line back into its `(sender, timestamp, contents)` triple.
pub fn parse_log_line(line: &str) -> Result<LogLine, LogLineError> {
    let (arrow, rest) = line.split_once(' ').ok_or(LogLineError::MissingArrow)?;
    let sender = match arrow {
        CLIENT_ARROW => Sender::Client,
        SERVER_ARROW => Sender::Server,
        _ => return Err(LogLineError::MissingArrow),
    };

    let (timestamp, contents) = rest.split_once(' ').ok_or(LogLineError::MissingTimestamp)?;
    let timestamp_ms = timestamp
        .parse::<i64>()
        .map_err(|_| LogLineError::BadTimestamp {
            value: timestamp.to_string(),
        })?;

    let contents: Value =
        serde_json::from_str(contents).map_err(|source| LogLineError::BadContents { source })?;

    Ok(LogLine {
        sender,
        timestamp_ms,
        contents,
    })
}
