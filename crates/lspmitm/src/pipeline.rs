//! Per-direction processing pipeline: framer → decoder → validator.
//!
//! Each inbound chunk is fully processed before the next is accepted;
//! emission is a non-blocking append to the returned event vector. The two
//! directions of a [`Pipeline::pair`] share nothing but the linked
//! correlation registry.

use crate::decode::decode_frame;
use crate::frame::{FrameError, Framer, FramerEvent};
use crate::message::{Sender, TypedMessage};
use crate::registry::RegistryHandle;
use crate::validate::{MethodValidator, SchemaValidator};

/// One downstream event: a classified message or a framing error. Every
/// malformed input produces exactly one of these.
#[derive(Debug)]
pub enum PipelineEvent {
    Message(TypedMessage),
    FrameError(FrameError),
}

/// A single direction of the observer: feed it raw bytes, collect ordered
/// events.
pub struct Pipeline {
    sender: Sender,
    framer: Framer,
    validator: SchemaValidator,
}

impl Pipeline {
    pub fn new(sender: Sender, registry: RegistryHandle) -> Self {
        Self {
            sender,
            framer: Framer::new(),
            validator: SchemaValidator::new(sender, registry),
        }
    }

    /// Builds the Client and Server pipelines over one freshly linked
    /// registry pair.
    pub fn pair() -> (Pipeline, Pipeline) {
        let (client_registry, server_registry) = RegistryHandle::linked_pair();
        (
            Pipeline::new(Sender::Client, client_registry),
            Pipeline::new(Sender::Server, server_registry),
        )
    }

    /// Replaces the validator's method-specific hook.
    pub fn with_method_validator(mut self, hook: Box<dyn MethodValidator>) -> Self {
        self.validator = self.validator.with_method_validator(hook);
        self
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// Processes one chunk of the inbound byte stream.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<PipelineEvent> {
        let mut framer_events = Vec::new();
        self.framer.push(bytes, &mut framer_events);
        self.process(framer_events)
    }

    /// Signals end-of-stream: flushes partial framer state (a mid-frame EOF
    /// becomes a `TruncatedFrame` error).
    pub fn finish(&mut self) -> Vec<PipelineEvent> {
        let mut framer_events = Vec::new();
        self.framer.finish(&mut framer_events);
        self.process(framer_events)
    }

    fn process(&mut self, framer_events: Vec<FramerEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        for event in framer_events {
            match event {
                FramerEvent::Error(error) => out.push(PipelineEvent::FrameError(error)),
                FramerEvent::Frame(frame) => match decode_frame(&frame) {
                    Ok(message) => {
                        for typed in self.validator.validate(message) {
                            out.push(PipelineEvent::Message(typed));
                        }
                    }
                    Err(error) => {
                        out.push(PipelineEvent::Message(
                            self.validator.decode_failure(&frame, &error),
                        ));
                    }
                },
            }
        }
        out
    }
}
