//! Ownership of emitted messages and realisation of the Request↔Response
//! link.
//!
//! Messages carry `(sender, seq)` references instead of pointers; the
//! [`MessageLog`] is the container those references resolve through. When a
//! correlated Response is appended, the stored Request's forward link is
//! completed here, so the pair is reachable in both directions without a
//! reference cycle.

use std::collections::HashMap;

use crate::message::{MessageKind, MessageRef, TypedMessage};

/// Append-only store of every message emitted by both pipelines, in arrival
/// order.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<TypedMessage>,
    by_ref: HashMap<MessageRef, usize>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message, completing the stored Request's `response` link
    /// when the new message is a Response that was correlated.
    pub fn append(&mut self, message: TypedMessage) {
        if let MessageKind::Response {
            request: Some(request_ref),
            ..
        } = &message.kind
        {
            let response_ref = message.message_ref();
            if let Some(&slot) = self.by_ref.get(request_ref) {
                if let MessageKind::Request { response, .. } = &mut self.messages[slot].kind {
                    *response = Some(response_ref);
                }
            }
        }

        self.by_ref.insert(message.message_ref(), self.messages.len());
        self.messages.push(message);
    }

    /// Resolves a `(sender, seq)` reference.
    pub fn get(&self, reference: MessageRef) -> Option<&TypedMessage> {
        self.by_ref
            .get(&reference)
            .map(|&slot| &self.messages[slot])
    }

    /// The Response paired with the Request at `reference`, if observed.
    pub fn response_of(&self, reference: MessageRef) -> Option<&TypedMessage> {
        match &self.get(reference)?.kind {
            MessageKind::Request {
                response: Some(response_ref),
                ..
            } => self.get(*response_ref),
            _ => None,
        }
    }

    /// The Request that the Response at `reference` answered, if matched.
    pub fn request_of(&self, reference: MessageRef) -> Option<&TypedMessage> {
        match &self.get(reference)?.kind {
            MessageKind::Response {
                request: Some(request_ref),
                ..
            } => self.get(*request_ref),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedMessage> {
        self.messages.iter()
    }
}
