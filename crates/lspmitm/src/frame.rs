//! Byte-stream framing for LSP-style `Content-Length` framed messages.
//!
//! [`Framer`] consumes an unbounded byte stream in arbitrary chunks and emits
//! [`Frame`]s and [`FrameError`]s in input order. Framing follows the
//! HTTP-style rules used by JSON-RPC-over-stdio: zero or more
//! `Name: value\r\n` header lines, an empty `\r\n` line, then exactly
//! `Content-Length` bytes of payload.
//!
//! After a framing error the framer resynchronises by restarting the header
//! parser one byte past the failed frame's start and replaying the discarded
//! region, sliding forward on each subsequent failure. Errors raised while a
//! gap is being skipped are suppressed; the first frame completed afterwards
//! is marked [`Frame::from_recovery_mode`].

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::ascii::{is_horizontal_whitespace, is_tchar, is_vchar};

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as i64
}

/// A message header as it appeared on the wire. Values are trimmed of
/// surrounding horizontal whitespace; the original name casing is preserved.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    /// ASCII case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A whole message extracted from the stream: parsed headers plus an opaque
/// payload of the declared length.
#[derive(Debug, Clone)]
pub struct Frame {
    /// When the frame was fully received, in wall-clock milliseconds.
    pub timestamp_ms: i64,
    /// Stream offset of the first header byte.
    pub frame_start: u64,
    /// Stream offset one past the last payload byte.
    pub frame_end: u64,
    /// Stream offset of the first payload byte.
    pub payload_start: u64,
    /// Headers in wire order. May contain duplicates.
    pub headers: Vec<Header>,
    /// The payload, exactly `Content-Length` bytes.
    pub payload: Vec<u8>,
    /// True if this is a frame completed while recovering from a framing
    /// error.
    pub from_recovery_mode: bool,
}

impl Frame {
    /// Total size of the frame on the wire, headers included.
    pub fn size(&self) -> usize {
        (self.frame_end - self.frame_start) as usize
    }
}

/// What went wrong while framing.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FrameErrorKind {
    /// A header line started with `:`.
    MissingHeaderName,
    /// A byte was not valid in the current framing state.
    UnexpectedCharacter,
    /// The header block declared no `Content-Length`.
    MissingContentLength,
    /// The header block declared `Content-Length` more than once.
    MultipleContentLength,
    /// The `Content-Length` value is not a decimal integer.
    ContentLengthNaN,
    /// The `Content-Length` value is negative.
    ContentLengthNegative,
    /// The stream ended in the middle of a frame.
    TruncatedFrame,
}

impl fmt::Display for FrameErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingHeaderName => "header field missing name",
            Self::UnexpectedCharacter => "unexpected character in stream",
            Self::MissingContentLength => "missing Content-Length header",
            Self::MultipleContentLength => "Content-Length is defined multiple times",
            Self::ContentLengthNaN => "Content-Length header value is not a number",
            Self::ContentLengthNegative => "Content-Length value is negative",
            Self::TruncatedFrame => "stream ended mid-frame",
        };
        f.write_str(text)
    }
}

/// A framing error event. The framer keeps consuming input after emitting
/// one; subsequent errors are suppressed until a frame completes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FrameError {
    /// Offset from the beginning of the stream where the error was found.
    pub global_offset: u64,
    /// Offset from the start of the current message.
    pub local_offset: u64,
    pub kind: FrameErrorKind,
}

/// Output of one [`Framer::push`] call, in emission order.
#[derive(Debug, Clone)]
pub enum FramerEvent {
    Frame(Frame),
    Error(FrameError),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum HeaderState {
    NameStart,
    Name,
    Value,
    ValueEnd,
    End,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
    Headers(HeaderState),
    Payload,
}

/// Resumable framing state machine. Feed it chunks of any size with
/// [`push`](Self::push); signal end-of-stream with [`finish`](Self::finish).
#[derive(Debug)]
pub struct Framer {
    state: State,
    queue: VecDeque<u8>,
    /// Raw bytes of the current header section, kept for replay on error.
    raw: Vec<u8>,
    headers: Vec<Header>,
    name: String,
    value: String,
    payload: Vec<u8>,
    pending: usize,
    /// Global index of the next byte to consume.
    offset: u64,
    frame_start: u64,
    /// 0 = normal; >0 = suppress errors, drained one per completed frame.
    recovery: u32,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            state: State::Headers(HeaderState::NameStart),
            queue: VecDeque::new(),
            raw: Vec::new(),
            headers: Vec::new(),
            name: String::new(),
            value: String::new(),
            payload: Vec::new(),
            pending: 0,
            offset: 0,
            frame_start: 0,
            recovery: 0,
        }
    }

    /// Consumes a chunk, appending any completed frames and errors to `out`.
    pub fn push(&mut self, input: &[u8], out: &mut Vec<FramerEvent>) {
        self.queue.extend(input.iter().copied());
        while let Some(b) = self.queue.pop_front() {
            self.accept(b, out);
        }
    }

    /// Signals end-of-stream. A partially accumulated frame produces one
    /// `TruncatedFrame` error (unless suppressed by recovery mode); clean
    /// boundaries produce nothing.
    pub fn finish(&mut self, out: &mut Vec<FramerEvent>) {
        let mid_frame = !self.raw.is_empty() || self.state == State::Payload;
        if mid_frame && self.recovery == 0 {
            out.push(FramerEvent::Error(FrameError {
                global_offset: self.offset,
                local_offset: self.offset - self.frame_start,
                kind: FrameErrorKind::TruncatedFrame,
            }));
        }
        self.raw.clear();
        self.reset_frame_state();
        self.frame_start = self.offset;
    }

    fn accept(&mut self, b: u8, out: &mut Vec<FramerEvent>) {
        let idx = self.offset;
        self.offset += 1;
        match self.state {
            State::Payload => {
                self.payload.push(b);
                self.pending -= 1;
                if self.pending == 0 {
                    self.emit_frame(out);
                }
            }
            State::Headers(header_state) => {
                self.raw.push(b);
                self.accept_header_byte(header_state, b, idx, out);
            }
        }
    }

    fn accept_header_byte(
        &mut self,
        header_state: HeaderState,
        b: u8,
        idx: u64,
        out: &mut Vec<FramerEvent>,
    ) {
        match header_state {
            HeaderState::NameStart => {
                if b == b':' {
                    // A field must have one or more token characters.
                    self.handle_error(idx, FrameErrorKind::MissingHeaderName, out);
                } else if b == b'\r' {
                    self.state = State::Headers(HeaderState::End);
                } else {
                    self.state = State::Headers(HeaderState::Name);
                    self.accept_name_byte(b, idx, out);
                }
            }
            HeaderState::Name => self.accept_name_byte(b, idx, out),
            HeaderState::Value => {
                if is_horizontal_whitespace(b) || is_vchar(b) {
                    self.value.push(b as char);
                } else if b == b'\r' {
                    self.state = State::Headers(HeaderState::ValueEnd);
                } else {
                    self.handle_error(idx, FrameErrorKind::UnexpectedCharacter, out);
                }
            }
            HeaderState::ValueEnd => {
                if b == b'\n' {
                    let value = self
                        .value
                        .trim_matches(|c| c == ' ' || c == '\t')
                        .to_string();
                    self.headers.push(Header {
                        name: mem::take(&mut self.name),
                        value,
                    });
                    self.value.clear();
                    self.state = State::Headers(HeaderState::NameStart);
                } else {
                    self.handle_error(idx, FrameErrorKind::UnexpectedCharacter, out);
                }
            }
            HeaderState::End => {
                if b == b'\n' {
                    self.begin_payload(idx, out);
                } else {
                    self.handle_error(idx, FrameErrorKind::UnexpectedCharacter, out);
                }
            }
        }
    }

    fn accept_name_byte(&mut self, b: u8, idx: u64, out: &mut Vec<FramerEvent>) {
        if is_tchar(b) {
            self.name.push(b as char);
        } else if b == b':' {
            self.state = State::Headers(HeaderState::Value);
        } else {
            self.handle_error(idx, FrameErrorKind::UnexpectedCharacter, out);
        }
    }

    /// Scans the committed headers for `Content-Length` and reserves that
    /// many payload bytes. Exactly one occurrence is required.
    fn begin_payload(&mut self, idx: u64, out: &mut Vec<FramerEvent>) {
        let mut length: Option<i64> = None;
        let mut violation: Option<FrameErrorKind> = None;

        for header in &self.headers {
            if !header.is("Content-Length") {
                continue;
            }
            if length.is_some() {
                violation = Some(FrameErrorKind::MultipleContentLength);
                break;
            }
            match header.value.parse::<i64>() {
                Ok(n) if n < 0 => {
                    violation = Some(FrameErrorKind::ContentLengthNegative);
                    break;
                }
                Ok(n) => length = Some(n),
                Err(_) => {
                    violation = Some(FrameErrorKind::ContentLengthNaN);
                    break;
                }
            }
        }

        if let Some(kind) = violation {
            return self.handle_error(idx, kind, out);
        }
        let Some(length) = length else {
            return self.handle_error(idx, FrameErrorKind::MissingContentLength, out);
        };

        // No error can occur while copying payload bytes, so the replay
        // buffer is no longer needed.
        self.raw.clear();
        self.state = State::Payload;
        self.pending = length as usize;
        self.payload.clear();
        if self.pending == 0 {
            self.emit_frame(out);
        }
    }

    fn emit_frame(&mut self, out: &mut Vec<FramerEvent>) {
        let frame_end = self.offset;
        let payload = mem::take(&mut self.payload);
        let payload_start = frame_end - payload.len() as u64;
        out.push(FramerEvent::Frame(Frame {
            timestamp_ms: now_millis(),
            frame_start: self.frame_start,
            frame_end,
            payload_start,
            headers: mem::take(&mut self.headers),
            payload,
            from_recovery_mode: self.recovery > 0,
        }));

        self.frame_start = frame_end;
        self.reset_frame_state();
        self.recovery = self.recovery.saturating_sub(1);
    }

    /// Reports the error (unless suppressed), discards the current frame and
    /// restarts the header parser one byte past its start, replaying the
    /// already-consumed bytes of the discarded region.
    fn handle_error(&mut self, idx: u64, kind: FrameErrorKind, out: &mut Vec<FramerEvent>) {
        if self.recovery == 0 {
            out.push(FramerEvent::Error(FrameError {
                global_offset: idx,
                local_offset: idx - self.frame_start,
                kind,
            }));
        }
        self.recovery += 1;

        let replay = mem::take(&mut self.raw);
        for &b in replay.iter().skip(1).rev() {
            self.queue.push_front(b);
        }
        self.frame_start += 1;
        self.offset = self.frame_start;
        self.reset_frame_state();
    }

    fn reset_frame_state(&mut self) {
        self.state = State::Headers(HeaderState::NameStart);
        self.headers.clear();
        self.name.clear();
        self.value.clear();
        self.payload.clear();
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &[u8]) -> Vec<FramerEvent> {
        let mut framer = Framer::new();
        let mut out = Vec::new();
        framer.push(input, &mut out);
        out
    }

    fn frames(events: &[FramerEvent]) -> Vec<&Frame> {
        events
            .iter()
            .filter_map(|event| match event {
                FramerEvent::Frame(frame) => Some(frame),
                FramerEvent::Error(_) => None,
            })
            .collect()
    }

    fn errors(events: &[FramerEvent]) -> Vec<FrameError> {
        events
            .iter()
            .filter_map(|event| match event {
                FramerEvent::Error(error) => Some(*error),
                FramerEvent::Frame(_) => None,
            })
            .collect()
    }

    const NOTIFICATION: &[u8] =
        b"Content-Length: 47\r\n\r\n{\"jsonrpc\":\"2.0\",\"method\":\"didOpen\",\"params\":{}}";

    #[test]
    fn well_formed_frame_with_offsets() {
        let events = run(NOTIFICATION);
        let frames = frames(&events);
        assert_eq!(frames.len(), 1);
        let frame = frames[0];

        assert_eq!(frame.frame_start, 0);
        assert_eq!(frame.payload_start, 22);
        assert_eq!(frame.frame_end, 69);
        assert_eq!(frame.frame_end - frame.payload_start, 47);
        assert_eq!(frame.payload.len(), 47);
        assert_eq!(frame.headers.len(), 1);
        assert_eq!(frame.headers[0].name, "Content-Length");
        assert_eq!(frame.headers[0].value, "47");
        assert!(!frame.from_recovery_mode);
        assert!(errors(&events).is_empty());
    }

    #[test]
    fn byte_at_a_time_matches_single_chunk() {
        let mut input = Vec::new();
        input.extend_from_slice(b"Content-Length: abc\r\n\r\n");
        input.extend_from_slice(NOTIFICATION);
        input.extend_from_slice(b"Content-Length: 2\r\n\r\n[]");

        let whole = run(&input);

        let mut framer = Framer::new();
        let mut trickled = Vec::new();
        for &b in &input {
            framer.push(&[b], &mut trickled);
        }

        assert_eq!(whole.len(), trickled.len());
        for (a, b) in whole.iter().zip(trickled.iter()) {
            match (a, b) {
                (FramerEvent::Frame(x), FramerEvent::Frame(y)) => {
                    assert_eq!(x.payload, y.payload);
                    assert_eq!(x.frame_start, y.frame_start);
                    assert_eq!(x.frame_end, y.frame_end);
                    assert_eq!(x.payload_start, y.payload_start);
                    assert_eq!(x.headers, y.headers);
                    assert_eq!(x.from_recovery_mode, y.from_recovery_mode);
                }
                (FramerEvent::Error(x), FramerEvent::Error(y)) => assert_eq!(x, y),
                other => panic!("event shape mismatch: {other:?}"),
            }
        }
    }

    #[test]
    fn empty_payload_emits_on_blank_line() {
        let input = b"Content-Length: 0\r\n\r\n";
        let events = run(input);
        let frames = frames(&events);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
        assert_eq!(frames[0].frame_end, input.len() as u64);
        assert_eq!(frames[0].payload_start, frames[0].frame_end);
    }

    #[test]
    fn colon_inside_value_is_value_text() {
        let events = run(b"X-Extra: a:b:c\r\nContent-Length: 2\r\n\r\n{}");
        let frames = frames(&events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].headers[0].name, "X-Extra");
        assert_eq!(frames[0].headers[0].value, "a:b:c");
    }

    #[test]
    fn value_surrounding_whitespace_is_trimmed() {
        let events = run(b"Content-Length: \t 2 \t\r\n\r\n{}");
        let frames = frames(&events);
        assert_eq!(frames[0].headers[0].value, "2");
    }

    #[test]
    fn duplicate_content_length_is_an_error() {
        let events = run(b"Content-Length: 2\r\ncontent-length: 2\r\n\r\n{}");
        let errs = errors(&events);
        assert!(!errs.is_empty());
        assert_eq!(errs[0].kind, FrameErrorKind::MultipleContentLength);
    }

    #[test]
    fn negative_content_length_is_an_error() {
        let events = run(b"Content-Length: -1\r\n\r\n");
        assert_eq!(errors(&events)[0].kind, FrameErrorKind::ContentLengthNegative);
    }

    #[test]
    fn missing_content_length_is_an_error() {
        let events = run(b"Content-Type: application/json\r\n\r\n");
        assert_eq!(errors(&events)[0].kind, FrameErrorKind::MissingContentLength);
    }

    #[test]
    fn leading_colon_reports_missing_header_name() {
        let events = run(b": oops\r\n");
        assert_eq!(errors(&events)[0].kind, FrameErrorKind::MissingHeaderName);
        assert_eq!(errors(&events)[0].global_offset, 0);
    }

    #[test]
    fn recovery_finds_frame_after_garbage() {
        let events = run(b"Content-Length: abc\r\n\r\nXXXContent-Length: 2\r\n\r\n{}");

        let errs = errors(&events);
        assert_eq!(errs.len(), 1, "errors in the gap must be suppressed");
        assert_eq!(errs[0].kind, FrameErrorKind::ContentLengthNaN);
        assert_eq!(errs[0].global_offset, 22);
        assert_eq!(errs[0].local_offset, 22);

        let frames = frames(&events);
        assert_eq!(frames.len(), 1);
        let frame = frames[0];
        assert_eq!(frame.payload, b"{}");
        assert!(frame.from_recovery_mode);
        assert_eq!(frame.frame_start, 26);
        assert_eq!(frame.payload_start, 47);
        assert_eq!(frame.frame_end, 49);
    }

    #[test]
    fn frames_after_recovery_keep_arriving() {
        let mut input = Vec::new();
        input.extend_from_slice(b"bad stream \x01\x02");
        input.extend_from_slice(NOTIFICATION);
        let events = run(&input);

        let frames = frames(&events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.len(), 47);
        assert!(frames[0].from_recovery_mode);
        assert_eq!(errors(&events).len(), 1);
    }

    #[test]
    fn chunk_boundary_inside_payload_resumes() {
        let (head, tail) = NOTIFICATION.split_at(30);
        let mut framer = Framer::new();
        let mut out = Vec::new();
        framer.push(head, &mut out);
        assert!(out.is_empty());
        framer.push(tail, &mut out);
        assert_eq!(frames(&out).len(), 1);
    }

    #[test]
    fn payload_concatenation_is_a_stream_substring() {
        let mut input = Vec::new();
        input.extend_from_slice(b"Content-Length: 2\r\n\r\nAB");
        input.extend_from_slice(b"Content-Length: 3\r\n\r\nCDE");
        let events = run(&input);
        let combined: Vec<u8> = frames(&events)
            .iter()
            .flat_map(|frame| frame.payload.iter().copied())
            .collect();
        assert_eq!(combined, b"ABCDE");
    }

    #[test]
    fn eof_mid_frame_reports_truncation() {
        let mut framer = Framer::new();
        let mut out = Vec::new();
        framer.push(b"Content-Length: 10\r\n\r\n{\"a\"", &mut out);
        framer.finish(&mut out);
        let errs = errors(&out);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, FrameErrorKind::TruncatedFrame);
        assert_eq!(errs[0].global_offset, 26);
        assert_eq!(errs[0].local_offset, 26);
    }

    #[test]
    fn eof_at_frame_boundary_is_silent() {
        let mut framer = Framer::new();
        let mut out = Vec::new();
        framer.push(b"Content-Length: 2\r\n\r\n{}", &mut out);
        framer.finish(&mut out);
        assert!(errors(&out).is_empty());
        assert_eq!(frames(&out).len(), 1);
    }

    #[test]
    fn header_casing_is_preserved_but_lookup_ignores_case() {
        let events = run(b"CONTENT-LENGTH: 2\r\n\r\n{}");
        let frames = frames(&events);
        assert_eq!(frames[0].headers[0].name, "CONTENT-LENGTH");
        assert!(frames[0].headers[0].is("content-length"));
    }
}
