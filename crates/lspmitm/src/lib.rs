#![forbid(unsafe_code)]
//! Inbound processing pipeline for observing JSON-RPC 2.0 traffic carried
//! over LSP-style framed byte streams.
//!
//! The crate interposes on a pair of byte streams (conventionally a language
//! client talking to a language server over stdio) and turns each direction
//! into a stream of structured, correlated events while leaving the bytes
//! themselves untouched. Each direction is the same four-stage chain:
//!
//! 1. [`Framer`] extracts `Content-Length` framed messages from a noisy,
//!    possibly resynchronising byte stream, emitting [`Frame`]s and
//!    recoverable [`FrameError`]s.
//! 2. [`decode_frame`] interprets a frame payload as JSON under the charset
//!    advertised by its `Content-Type` header.
//! 3. [`SchemaValidator`] classifies each document under the JSON-RPC 2.0
//!    envelope rules (Notification / Request / Response / Unknown), attaching
//!    a JSON-shaped [`SchemaIssueTree`] of violations rather than rejecting.
//! 4. The linked [`RegistryHandle`] pair records in-flight Requests so that
//!    Responses observed on the opposite direction are paired by id.
//!
//! [`Pipeline`] wires the chain for one direction; [`Pipeline::pair`] builds
//! both directions over one shared registry. Emitted [`TypedMessage`]s are
//! owned by a [`MessageLog`], which also completes the Request↔Response
//! back-links (messages reference each other by `(sender, seq)`, never by
//! pointer). [`to_log_line`]/[`parse_log_line`] round-trip messages through
//! the persisted one-line-per-message format.
//!
//! ```
//! use lspmitm::{Pipeline, PipelineEvent};
//!
//! let (mut client, mut server) = Pipeline::pair();
//! let events = client.push(
//!     b"Content-Length: 40\r\n\r\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}",
//! );
//! assert!(matches!(events[0], PipelineEvent::Message(_)));
//! // Bytes from the server side are fed to `server.push` the same way; a
//! // response with id 1 over there pairs with the request seen here.
//! # let _ = server.push(b"");
//! ```
//!
//! Schema violations never drop a message: malformed JSON becomes an
//! `Unknown` message carrying one issue, framing garbage becomes a single
//! `FrameError` followed by resynchronisation, and well-formed traffic after
//! a gap is still delivered.

mod ascii;
mod decode;
mod frame;
mod header_value;
mod issue;
mod logline;
mod message;
mod pipeline;
mod registry;
mod store;
mod validate;

pub use decode::{decode_frame, DecodeError, Message};
pub use frame::{Frame, FrameError, FrameErrorKind, Framer, FramerEvent, Header};
pub use header_value::{ContentType, HeaderValueError, HeaderValueParser};
pub use issue::{MemberSlot, SchemaIssue, SchemaIssueTree, Severity};
pub use logline::{parse_log_line, to_log_line, LogLine, LogLineError};
pub use message::{Id, MessageKind, MessageRef, Sender, TypedMessage};
pub use pipeline::{Pipeline, PipelineEvent};
pub use registry::{PendingRequest, RegistryHandle};
pub use store::MessageLog;
pub use validate::{MethodValidator, NoopMethodValidator, SchemaValidator};
