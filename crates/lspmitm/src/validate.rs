//! JSON-RPC 2.0 envelope validation and message classification.
//!
//! A [`SchemaValidator`] is stateful per direction: it numbers the messages
//! it emits and records in-flight Requests in the linked registry so that
//! Responses arriving on the opposite direction can be paired.

use serde_json::{Map, Value};

use crate::decode::{DecodeError, Message};
use crate::frame::Frame;
use crate::issue::SchemaIssueTree;
use crate::message::{Id, MessageKind, MessageRef, Sender, TypedMessage};
use crate::registry::{PendingRequest, RegistryHandle};

/// Method-specific validation hook for Requests and Notifications.
///
/// The default performs no additional checks; implementations can inspect
/// `params` and record findings on the issue tree.
pub trait MethodValidator: Send {
    fn validate_method(&self, method: &str, params: Option<&Value>, issues: &mut SchemaIssueTree) {
        let _ = (method, params, issues);
    }
}

/// The do-nothing default hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMethodValidator;

impl MethodValidator for NoopMethodValidator {}

enum MethodState<'a> {
    Absent,
    Valid(&'a str),
    Invalid,
}

enum IdState {
    Absent,
    Valid(Id),
    Null,
    Invalid,
}

/// Classifies decoded messages, attaches schema-issue trees, and correlates
/// Requests with Responses through the linked registry pair.
pub struct SchemaValidator {
    sender: Sender,
    registry: RegistryHandle,
    next_seq: u64,
    method_validator: Box<dyn MethodValidator>,
}

impl SchemaValidator {
    pub fn new(sender: Sender, registry: RegistryHandle) -> Self {
        Self {
            sender,
            registry,
            next_seq: 0,
            method_validator: Box::new(NoopMethodValidator),
        }
    }

    /// Replaces the method-specific validation hook.
    pub fn with_method_validator(mut self, hook: Box<dyn MethodValidator>) -> Self {
        self.method_validator = hook;
        self
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// Validates one decoded message. An object root yields exactly one
    /// typed message; an array root is a batch and is flattened into one
    /// typed message per entry.
    pub fn validate(&mut self, message: Message) -> Vec<TypedMessage> {
        let Message {
            timestamp_ms,
            size,
            contents,
        } = message;

        match contents {
            Value::Array(entries) => self.validate_batch(timestamp_ms, size, entries),
            Value::Object(map) => {
                vec![self.validate_envelope(timestamp_ms, size, map)]
            }
            other => {
                let mut issues = SchemaIssueTree::leaf();
                issues.error("Unexpected message JSON type");
                vec![self.emit(timestamp_ms, size, other, MessageKind::Unknown, issues)]
            }
        }
    }

    /// Builds the Unknown message that stands in for a frame whose payload
    /// could not be decoded.
    pub fn decode_failure(&mut self, frame: &Frame, error: &DecodeError) -> TypedMessage {
        let mut issues = SchemaIssueTree::leaf();
        issues.error(format!("Payload could not be decoded: {error}"));
        self.emit(
            frame.timestamp_ms,
            frame.size(),
            Value::Null,
            MessageKind::Unknown,
            issues,
        )
    }

    fn validate_batch(
        &mut self,
        timestamp_ms: i64,
        size: usize,
        entries: Vec<Value>,
    ) -> Vec<TypedMessage> {
        if entries.is_empty() {
            let mut issues = SchemaIssueTree::array();
            issues.error("Empty batch");
            return vec![self.emit(
                timestamp_ms,
                size,
                Value::Array(Vec::new()),
                MessageKind::Unknown,
                issues,
            )];
        }

        entries
            .into_iter()
            .map(|entry| match entry {
                Value::Object(map) => self.validate_envelope(timestamp_ms, size, map),
                // Nested arrays are forbidden; primitives have no envelope.
                other => {
                    let mut issues = SchemaIssueTree::leaf();
                    issues.error("Unexpected batch entry type");
                    self.emit(timestamp_ms, size, other, MessageKind::Unknown, issues)
                }
            })
            .collect()
    }

    fn validate_envelope(
        &mut self,
        timestamp_ms: i64,
        size: usize,
        map: Map<String, Value>,
    ) -> TypedMessage {
        let mut issues = SchemaIssueTree::object();

        validate_jsonrpc_member(&map, &mut issues);

        let method = match map.get("method") {
            None => MethodState::Absent,
            Some(Value::String(method)) => MethodState::Valid(method),
            Some(_) => {
                issues.key_error("method", "Expected method to be a string");
                MethodState::Invalid
            }
        };

        let id = match map.get("id") {
            None => IdState::Absent,
            Some(Value::Null) => IdState::Null,
            Some(Value::String(s)) => IdState::Valid(Id::String(s.clone())),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(n) => IdState::Valid(Id::Number(n)),
                None => {
                    issues.key_error("id", "Expected id to be a string or an integer");
                    IdState::Invalid
                }
            },
            Some(_) => {
                issues.key_error("id", "Expected id to be a string or an integer");
                IdState::Invalid
            }
        };

        for key in map.keys() {
            if !matches!(
                key.as_str(),
                "jsonrpc" | "method" | "id" | "params" | "result" | "error"
            ) {
                issues.key_error(key, format!("Unexpected member '{key}'"));
            }
        }

        let params = map.get("params");
        let kind = match (method, id) {
            (MethodState::Valid(method), IdState::Absent) => {
                check_params(params, &mut issues);
                self.method_validator
                    .validate_method(method, params, &mut issues);
                MessageKind::Notification {
                    method: method.to_string(),
                }
            }
            (MethodState::Valid(method), IdState::Valid(id)) => {
                check_params(params, &mut issues);
                self.method_validator
                    .validate_method(method, params, &mut issues);
                let pending = PendingRequest {
                    seq: self.next_seq,
                    method: method.to_string(),
                    timestamp_ms,
                };
                if let Some(shadowed) = self.registry.insert_request(&id, pending) {
                    issues.key_error(
                        "id",
                        format!(
                            "Id already in use by an outstanding request ({})",
                            shadowed.method
                        ),
                    );
                }
                MessageKind::Request {
                    method: method.to_string(),
                    id,
                    response: None,
                }
            }
            (MethodState::Absent, IdState::Valid(id)) => {
                self.validate_response(timestamp_ms, Some(id), &map, &mut issues)
            }
            (MethodState::Absent, IdState::Null) => {
                self.validate_response(timestamp_ms, None, &map, &mut issues)
            }
            _ => {
                issues.error("Could not identify message kind");
                MessageKind::Unknown
            }
        };

        self.emit(timestamp_ms, size, Value::Object(map), kind, issues)
    }

    fn validate_response(
        &mut self,
        timestamp_ms: i64,
        id: Option<Id>,
        map: &Map<String, Value>,
        issues: &mut SchemaIssueTree,
    ) -> MessageKind {
        match (map.get("result"), map.get("error")) {
            (Some(_), Some(_)) => {
                issues.key_error("error", "'error' member not permitted when there is a result");
            }
            (Some(_), None) => {}
            (None, Some(error)) => validate_response_error(error, issues),
            (None, None) => {
                issues.error("'result' or 'error' member required on Response");
            }
        }

        match id {
            Some(id) => match self.registry.retrieve_for_response(&id) {
                Some(request) => MessageKind::Response {
                    id: Some(id),
                    method: Some(request.method),
                    request: Some(MessageRef {
                        sender: self.sender.opposite(),
                        seq: request.seq,
                    }),
                    duration_ms: Some(timestamp_ms - request.timestamp_ms),
                },
                None => {
                    issues.error("Id does not correspond to any pending Request");
                    MessageKind::Response {
                        id: Some(id),
                        method: None,
                        request: None,
                        duration_ms: None,
                    }
                }
            },
            None => {
                issues.key_error("id", "Null id cannot be correlated with a Request");
                MessageKind::Response {
                    id: None,
                    method: None,
                    request: None,
                    duration_ms: None,
                }
            }
        }
    }

    fn emit(
        &mut self,
        timestamp_ms: i64,
        size: usize,
        contents: Value,
        kind: MessageKind,
        issues: SchemaIssueTree,
    ) -> TypedMessage {
        let seq = self.next_seq;
        self.next_seq += 1;
        TypedMessage {
            sender: self.sender,
            seq,
            timestamp_ms,
            size,
            contents,
            kind,
            issues,
        }
    }
}

fn validate_jsonrpc_member(map: &Map<String, Value>, issues: &mut SchemaIssueTree) {
    match map.get("jsonrpc") {
        None => issues.error("'jsonrpc' member missing"),
        Some(Value::String(version)) => {
            if version != "2.0" {
                issues.member("jsonrpc").error("Expected value to be \"2.0\"");
            }
        }
        Some(_) => issues.key_error("jsonrpc", "Expected value to be the string \"2.0\""),
    }
}

fn check_params(params: Option<&Value>, issues: &mut SchemaIssueTree) {
    if let Some(params) = params {
        if !params.is_object() && !params.is_array() {
            issues.key_error("params", "Expected params to be an object or array");
        }
    }
}

fn recognised_error_code(code: i64) -> bool {
    matches!(
        code,
        -32700 | -32603..=-32600 | -32099..=-32000 | -32800 | -32801
    )
}

fn validate_response_error(error: &Value, issues: &mut SchemaIssueTree) {
    let Value::Object(error) = error else {
        issues.key_error("error", "'error' member must be an object");
        return;
    };

    let error_issues = issues.member("error");
    let mut has_code = false;
    let mut has_message = false;

    for (key, value) in error {
        match key.as_str() {
            "code" => {
                has_code = true;
                match value.as_i64() {
                    Some(code) if recognised_error_code(code) => {}
                    Some(_) => error_issues.key_warning("code", "Error code not recognised"),
                    None => error_issues.key_error("code", "The 'code' member must be an integer"),
                }
            }
            "message" => {
                has_message = true;
                if !value.is_string() {
                    error_issues.key_error("message", "Error message must be a string");
                }
            }
            // `data` can be anything, or be omitted.
            "data" => {}
            _ => error_issues.key_error(key, format!("Unexpected member '{key}'")),
        }
    }

    if !has_code {
        error_issues.error("'code' member required on Response error");
    }
    if !has_message {
        error_issues.error("'message' member required on Response error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(contents: Value) -> Message {
        Message {
            timestamp_ms: 10_000,
            size: 64,
            contents,
        }
    }

    fn pair() -> (SchemaValidator, SchemaValidator) {
        let (client_registry, server_registry) = RegistryHandle::linked_pair();
        (
            SchemaValidator::new(Sender::Client, client_registry),
            SchemaValidator::new(Sender::Server, server_registry),
        )
    }

    fn single(validator: &mut SchemaValidator, contents: Value) -> TypedMessage {
        let mut out = validator.validate(message(contents));
        assert_eq!(out.len(), 1);
        out.remove(0)
    }

    #[test]
    fn clean_notification() {
        let (mut client, _) = pair();
        let msg = single(
            &mut client,
            json!({"jsonrpc": "2.0", "method": "didOpen", "params": {}}),
        );
        assert!(matches!(
            &msg.kind,
            MessageKind::Notification { method } if method == "didOpen"
        ));
        assert_eq!(msg.issue_count(), 0);
        assert_eq!(msg.sender, Sender::Client);
    }

    #[test]
    fn missing_jsonrpc_is_a_root_error() {
        let (mut client, _) = pair();
        let msg = single(&mut client, json!({"method": "m"}));
        assert_eq!(msg.issues.local_issues().len(), 1);
        assert_eq!(msg.issues.local_issues()[0].message, "'jsonrpc' member missing");
    }

    #[test]
    fn non_string_jsonrpc_is_a_key_error() {
        let (mut client, _) = pair();
        let msg = single(&mut client, json!({"jsonrpc": 2.0, "method": "m"}));
        assert_eq!(msg.issues.key_issues("jsonrpc").len(), 1);
    }

    #[test]
    fn wrong_jsonrpc_value_lands_on_the_member_tree() {
        let (mut client, _) = pair();
        let msg = single(&mut client, json!({"jsonrpc": "1.0", "method": "m"}));
        let member = msg.issues.member_tree("jsonrpc").unwrap();
        assert_eq!(member.local_issues().len(), 1);
    }

    #[test]
    fn unexpected_top_level_member_is_flagged() {
        let (mut client, _) = pair();
        let msg = single(
            &mut client,
            json!({"jsonrpc": "2.0", "method": "m", "extra": 1}),
        );
        assert_eq!(msg.issues.key_issues("extra").len(), 1);
        assert_eq!(msg.issue_count(), 1);
    }

    #[test]
    fn result_and_error_members_are_not_unexpected() {
        let (mut client, mut server) = pair();
        single(&mut client, json!({"jsonrpc": "2.0", "method": "m", "id": 1}));
        let msg = single(&mut server, json!({"jsonrpc": "2.0", "id": 1, "result": null}));
        assert_eq!(msg.issue_count(), 0);
    }

    #[test]
    fn non_string_method_is_unknown_with_key_issue() {
        let (mut client, _) = pair();
        let msg = single(&mut client, json!({"jsonrpc": "2.0", "method": 5}));
        assert!(matches!(msg.kind, MessageKind::Unknown));
        assert_eq!(msg.issues.key_issues("method").len(), 1);
    }

    #[test]
    fn fractional_id_is_flagged() {
        let (mut client, _) = pair();
        for id in [json!(1.5), json!(1.0), json!(true), json!([1])] {
            let msg = single(
                &mut client,
                json!({"jsonrpc": "2.0", "method": "m", "id": id}),
            );
            assert_eq!(msg.issues.key_issues("id").len(), 1, "id {id:?}");
            assert!(matches!(msg.kind, MessageKind::Unknown));
        }
    }

    #[test]
    fn invalid_params_type_is_flagged() {
        let (mut client, _) = pair();
        let msg = single(
            &mut client,
            json!({"jsonrpc": "2.0", "method": "m", "params": 3}),
        );
        assert_eq!(msg.issues.key_issues("params").len(), 1);
    }

    #[test]
    fn request_and_response_pair_across_directions() {
        let (mut client, mut server) = pair();

        let request = single(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        );
        assert_eq!(request.issue_count(), 0);
        assert!(matches!(
            &request.kind,
            MessageKind::Request { method, id, response: None }
                if method == "ping" && *id == Id::from(1)
        ));

        let mut out = server.validate(Message {
            timestamp_ms: 10_050,
            size: 64,
            contents: json!({"jsonrpc": "2.0", "id": 1, "result": "pong"}),
        });
        let response = out.remove(0);
        assert_eq!(response.issue_count(), 0);
        match &response.kind {
            MessageKind::Response {
                id,
                method,
                request: matched,
                duration_ms,
            } => {
                assert_eq!(id.as_ref(), Some(&Id::from(1)));
                assert_eq!(method.as_deref(), Some("ping"));
                assert_eq!(
                    *matched,
                    Some(MessageRef {
                        sender: Sender::Client,
                        seq: request.seq,
                    })
                );
                assert_eq!(*duration_ms, Some(50));
            }
            other => panic!("expected a Response, got {other:?}"),
        }
    }

    #[test]
    fn response_id_kind_must_match_request_id_kind() {
        let (mut client, mut server) = pair();
        single(&mut client, json!({"jsonrpc": "2.0", "id": 1, "method": "m"}));
        // `"1"` is not `1`; the registry spaces are disjoint.
        let response = single(&mut server, json!({"jsonrpc": "2.0", "id": "1", "result": 0}));
        assert!(matches!(
            &response.kind,
            MessageKind::Response { request: None, .. }
        ));
        assert_eq!(response.issue_count(), 1);
    }

    #[test]
    fn duplicate_request_id_names_the_shadowed_method() {
        let (mut client, _) = pair();
        let first = single(&mut client, json!({"jsonrpc": "2.0", "id": 5, "method": "a"}));
        assert_eq!(first.issue_count(), 0);

        let second = single(&mut client, json!({"jsonrpc": "2.0", "id": 5, "method": "b"}));
        let key_issues = second.issues.key_issues("id");
        assert_eq!(key_issues.len(), 1);
        assert!(
            key_issues[0].message.contains("(a)"),
            "issue must name the shadowed method: {}",
            key_issues[0].message
        );
    }

    #[test]
    fn malformed_response_collects_unknown_id_and_missing_result() {
        let (_, mut server) = pair();
        let msg = single(&mut server, json!({"jsonrpc": "2.0", "id": 7}));

        assert!(matches!(
            &msg.kind,
            MessageKind::Response { request: None, id: Some(id), .. } if *id == Id::from(7)
        ));
        let texts: Vec<&str> = msg
            .issues
            .local_issues()
            .iter()
            .map(|issue| issue.message.as_str())
            .collect();
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().any(|t| t.contains("pending Request")));
        assert!(texts.iter().any(|t| t.contains("'result' or 'error'")));
    }

    #[test]
    fn null_id_response_stands_alone() {
        let (_, mut server) = pair();
        let msg = single(
            &mut server,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "parse"}}),
        );
        assert!(matches!(
            &msg.kind,
            MessageKind::Response { id: None, request: None, .. }
        ));
        assert_eq!(msg.issues.key_issues("id").len(), 1);
    }

    #[test]
    fn result_and_error_together_are_flagged() {
        let (_, mut server) = pair();
        let msg = single(
            &mut server,
            json!({"jsonrpc": "2.0", "id": null, "result": 1, "error": {}}),
        );
        assert_eq!(msg.issues.key_issues("error").len(), 1);
    }

    #[test]
    fn error_object_shape_is_validated() {
        let (_, mut server) = pair();
        let msg = single(
            &mut server,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": "nope", "extra": 1}}),
        );
        let error_tree = msg.issues.member_tree("error").unwrap();
        assert_eq!(error_tree.key_issues("code").len(), 1);
        assert_eq!(error_tree.key_issues("extra").len(), 1);
        // `message` is missing entirely.
        assert_eq!(error_tree.local_issues().len(), 1);
    }

    #[test]
    fn non_object_error_member_is_flagged_at_the_key() {
        let (_, mut server) = pair();
        let msg = single(&mut server, json!({"jsonrpc": "2.0", "id": null, "error": 3}));
        assert_eq!(msg.issues.key_issues("error").len(), 1);
    }

    #[test]
    fn unrecognised_error_code_is_a_warning() {
        use crate::issue::Severity;
        let (_, mut server) = pair();
        let msg = single(
            &mut server,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -1, "message": "m"}}),
        );
        let error_tree = msg.issues.member_tree("error").unwrap();
        let code_issues = error_tree.key_issues("code");
        assert_eq!(code_issues.len(), 1);
        assert_eq!(code_issues[0].severity, Severity::Warning);
    }

    #[test]
    fn recognised_error_codes_pass() {
        for code in [-32700, -32600, -32601, -32602, -32603, -32050, -32000, -32099, -32800, -32801]
        {
            assert!(recognised_error_code(code), "{code}");
        }
        for code in [-1, 0, -32100, -32702, -32802] {
            assert!(!recognised_error_code(code), "{code}");
        }
    }

    #[test]
    fn batch_is_flattened_into_independent_messages() {
        let (mut client, _) = pair();
        let out = client.validate(message(json!([
            {"jsonrpc": "2.0", "method": "a"},
            {"jsonrpc": "2.0", "method": "b", "id": 1},
            42,
            [{"jsonrpc": "2.0", "method": "nested"}]
        ])));

        assert_eq!(out.len(), 4);
        assert!(matches!(&out[0].kind, MessageKind::Notification { method } if method == "a"));
        assert!(matches!(&out[1].kind, MessageKind::Request { .. }));
        assert!(matches!(out[2].kind, MessageKind::Unknown));
        assert!(matches!(out[3].kind, MessageKind::Unknown));
        assert_eq!(out[2].issues.local_issues()[0].message, "Unexpected batch entry type");
        assert_eq!(out[3].issues.local_issues()[0].message, "Unexpected batch entry type");

        // Sequence indices stay monotonic across the flattened entries.
        let seqs: Vec<u64> = out.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        // All entries share the batch frame's timestamp.
        assert!(out.iter().all(|m| m.timestamp_ms == 10_000));
    }

    #[test]
    fn empty_batch_yields_one_unknown() {
        let (mut client, _) = pair();
        let out = client.validate(message(json!([])));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].kind, MessageKind::Unknown));
        assert_eq!(out[0].issue_count(), 1);
    }

    #[test]
    fn unclassifiable_object_is_unknown() {
        let (mut client, _) = pair();
        let msg = single(&mut client, json!({"jsonrpc": "2.0"}));
        assert!(matches!(msg.kind, MessageKind::Unknown));
        assert!(msg
            .issues
            .local_issues()
            .iter()
            .any(|issue| issue.message == "Could not identify message kind"));
    }

    #[test]
    fn method_hook_receives_requests_and_notifications() {
        struct RejectEverything;
        impl MethodValidator for RejectEverything {
            fn validate_method(
                &self,
                method: &str,
                _params: Option<&Value>,
                issues: &mut SchemaIssueTree,
            ) {
                issues.error(format!("method '{method}' rejected"));
            }
        }

        let (client_registry, _server_registry) = RegistryHandle::linked_pair();
        let mut validator = SchemaValidator::new(Sender::Client, client_registry)
            .with_method_validator(Box::new(RejectEverything));

        let notification = single(&mut validator, json!({"jsonrpc": "2.0", "method": "n"}));
        assert_eq!(notification.issue_count(), 1);
        let request = single(
            &mut validator,
            json!({"jsonrpc": "2.0", "method": "r", "id": 1}),
        );
        assert_eq!(request.issue_count(), 1);
    }

    #[test]
    fn decode_failure_becomes_unknown_with_one_issue() {
        let (mut client, _) = pair();
        let frame = Frame {
            timestamp_ms: 42,
            frame_start: 0,
            frame_end: 30,
            payload_start: 24,
            headers: vec![],
            payload: b"{nope}".to_vec(),
            from_recovery_mode: false,
        };
        let error = DecodeError::NonContainerRoot;
        let msg = client.decode_failure(&frame, &error);
        assert!(matches!(msg.kind, MessageKind::Unknown));
        assert_eq!(msg.issue_count(), 1);
        assert_eq!(msg.timestamp_ms, 42);
        assert_eq!(msg.size, 30);
    }
}
