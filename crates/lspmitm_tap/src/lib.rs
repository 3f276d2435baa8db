#![forbid(unsafe_code)]
//! Stdio tap around a language server process.
//!
//! Wires the [`lspmitm`] pipelines between a client (this process' stdin and
//! stdout) and a spawned server subprocess: every byte is forwarded
//! unmodified in both directions while also being framed, decoded, validated
//! and correlated into [`TapEvent`]s on an unbounded channel. Mirroring is
//! independent of parsing — malformed traffic still flows.
//!
//! [`run_tap`] drives a connection over any pair of byte streams (tests use
//! in-memory pipes); [`run_stdio_proxy`] is the full arrangement around a
//! child process, as used by the `lspmitm` binary.

mod error;
mod proxy;
mod tap;

pub use error::TapError;
pub use proxy::run_stdio_proxy;
pub use tap::{run_direction, run_tap, TapEvent};
