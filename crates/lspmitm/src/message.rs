//! The typed message model: sender identity, JSON-RPC ids, and the closed
//! set of classified message kinds.
//!
//! Request↔Response links are `(sender, sequence)` references resolved
//! through the owning [`MessageLog`](crate::MessageLog), never owning
//! pointers, so the mutual link cannot form a reference cycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::issue::SchemaIssueTree;

/// Which side of the observed connection produced a message.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Sender {
    Client,
    Server,
}

impl Sender {
    pub fn opposite(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("Client"),
            Self::Server => f.write_str("Server"),
        }
    }
}

/// A JSON-RPC id: a string or an integer-valued number. Numbers and strings
/// with the same printable form are distinct (`1` never equals `"1"`).
///
/// JSON `null`, permitted only on Responses, is modelled as the absence of an
/// `Id` (`Option<Id>` with `None`) at the use site.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
}

impl From<i64> for Id {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => fmt::Display::fmt(n, f),
            // Debug form, so `92` and `"92"` stay visually distinct.
            Self::String(s) => fmt::Debug::fmt(s, f),
        }
    }
}

/// Reference to a message owned by a [`MessageLog`](crate::MessageLog):
/// the emitting side plus its per-pipeline sequence index.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct MessageRef {
    pub sender: Sender,
    pub seq: u64,
}

/// Kind-specific payload of a [`TypedMessage`].
///
/// Batch arrays are flattened before classification, so every value here
/// describes a single JSON-RPC envelope.
#[derive(Debug, Clone)]
pub enum MessageKind {
    /// Has `method`, no `id`. Expects no acknowledgement.
    Notification { method: String },
    /// Has `method` and `id`. `response` is completed by the owning store
    /// once the matching Response is observed on the opposite direction.
    Request {
        method: String,
        id: Id,
        response: Option<MessageRef>,
    },
    /// Has `id` (or JSON `null`, modelled as `None`). `method`, `request`
    /// and `duration_ms` are filled from the correlated Request, when one
    /// was found.
    Response {
        id: Option<Id>,
        method: Option<String>,
        request: Option<MessageRef>,
        duration_ms: Option<i64>,
    },
    /// Shape did not match any known kind.
    Unknown,
}

impl MessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Notification { .. } => "Notification",
            Self::Request { .. } => "Request",
            Self::Response { .. } => "Response",
            Self::Unknown => "Unknown",
        }
    }
}

/// A decoded message classified under the JSON-RPC 2.0 envelope rules,
/// annotated with its schema-issue tree.
#[derive(Debug, Clone)]
pub struct TypedMessage {
    pub sender: Sender,
    /// Monotonically increasing, unique per pipeline instance.
    pub seq: u64,
    /// When the underlying frame completed arriving, wall-clock milliseconds.
    pub timestamp_ms: i64,
    /// Size of the originating frame in bytes, headers included.
    pub size: usize,
    /// The message contents as parsed JSON.
    pub contents: Value,
    pub kind: MessageKind,
    pub issues: SchemaIssueTree,
}

impl TypedMessage {
    /// The method associated with this message: its own for Notifications
    /// and Requests, the correlated Request's for Responses.
    pub fn method(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Notification { method } | MessageKind::Request { method, .. } => {
                Some(method)
            }
            MessageKind::Response { method, .. } => method.as_deref(),
            MessageKind::Unknown => None,
        }
    }

    /// The JSON-RPC id carried by this message, if any.
    pub fn id(&self) -> Option<&Id> {
        match &self.kind {
            MessageKind::Request { id, .. } => Some(id),
            MessageKind::Response { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// Elapsed milliseconds between the correlated Request and this
    /// Response. `None` for anything that is not a correlated Response.
    pub fn duration_ms(&self) -> Option<i64> {
        match &self.kind {
            MessageKind::Response { duration_ms, .. } => *duration_ms,
            _ => None,
        }
    }

    pub fn issue_count(&self) -> usize {
        self.issues.issue_count()
    }

    /// This message's `(sender, seq)` reference.
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            sender: self.sender,
            seq: self.seq,
        }
    }
}
