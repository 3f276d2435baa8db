//! JSON-shaped tree of schema issues.
//!
//! A [`SchemaIssueTree`] mirrors the shape of the message it annotates:
//! object nodes map property names to per-key issue lists plus a child tree,
//! array nodes hold ordered child trees, leaves carry only local issues.
//! Every node additionally carries issues that apply to the whole value at
//! that location.
//!
//! Shape misuse (`key_error` on an array node, `entry` on an object node) is
//! a programmer error and panics.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single schema violation. Its location is implicit in its position
/// within the tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SchemaIssue {
    pub severity: Severity,
    pub message: String,
}

impl SchemaIssue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

/// Issues attached to an object property: the per-key list plus the child
/// tree for the property's own value.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MemberSlot {
    pub issues: Vec<SchemaIssue>,
    pub child: SchemaIssueTree,
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Shape {
    Leaf,
    Object(BTreeMap<String, MemberSlot>),
    Array(Vec<SchemaIssueTree>),
}

/// One node of the issue tree. Freshly created trees are leaves; they deepen
/// into objects or arrays the first time a structured child is addressed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SchemaIssueTree {
    issues: Vec<SchemaIssue>,
    shape: Shape,
}

impl Default for SchemaIssueTree {
    fn default() -> Self {
        Self::leaf()
    }
}

impl SchemaIssueTree {
    pub fn leaf() -> Self {
        Self {
            issues: Vec::new(),
            shape: Shape::Leaf,
        }
    }

    pub fn object() -> Self {
        Self {
            issues: Vec::new(),
            shape: Shape::Object(BTreeMap::new()),
        }
    }

    pub fn array() -> Self {
        Self {
            issues: Vec::new(),
            shape: Shape::Array(Vec::new()),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self.shape, Shape::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.shape, Shape::Array(_))
    }

    /// Appends a whole-value error at this node.
    pub fn error(&mut self, message: impl Into<String>) {
        self.issues.push(SchemaIssue::error(message));
    }

    /// Appends a whole-value warning at this node.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.issues.push(SchemaIssue::warning(message));
    }

    /// Appends a whole-value informational note at this node.
    pub fn info(&mut self, message: impl Into<String>) {
        self.issues.push(SchemaIssue::info(message));
    }

    /// Issues local to this node, whole-value only.
    pub fn local_issues(&self) -> &[SchemaIssue] {
        &self.issues
    }

    /// Appends an error to the per-key issue list of `key`, distinct from the
    /// child tree at that key.
    pub fn key_error(&mut self, key: &str, message: impl Into<String>) {
        self.key_slot(key).issues.push(SchemaIssue::error(message));
    }

    /// Appends a warning to the per-key issue list of `key`.
    pub fn key_warning(&mut self, key: &str, message: impl Into<String>) {
        self.key_slot(key)
            .issues
            .push(SchemaIssue::warning(message));
    }

    /// The child tree at `key`, created empty if absent. Deepens a leaf into
    /// an object; panics on an array node.
    pub fn member(&mut self, key: &str) -> &mut SchemaIssueTree {
        &mut self.key_slot(key).child
    }

    /// The per-key issues recorded at `key`, if any.
    pub fn key_issues(&self, key: &str) -> &[SchemaIssue] {
        match &self.shape {
            Shape::Object(members) => members
                .get(key)
                .map(|slot| slot.issues.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// The child tree recorded at `key`, if any.
    pub fn member_tree(&self, key: &str) -> Option<&SchemaIssueTree> {
        match &self.shape {
            Shape::Object(members) => members.get(key).map(|slot| &slot.child),
            _ => None,
        }
    }

    /// The child tree at `index`, created (along with any preceding gaps) if
    /// absent. Deepens a leaf into an array; panics on an object node.
    pub fn entry(&mut self, index: usize) -> &mut SchemaIssueTree {
        if matches!(self.shape, Shape::Leaf) {
            self.shape = Shape::Array(Vec::new());
        }
        match &mut self.shape {
            Shape::Array(entries) => {
                if entries.len() <= index {
                    entries.resize_with(index + 1, SchemaIssueTree::leaf);
                }
                &mut entries[index]
            }
            _ => panic!("entry() called on a non-array issue node"),
        }
    }

    /// The child tree at `index`, if present.
    pub fn entry_tree(&self, index: usize) -> Option<&SchemaIssueTree> {
        match &self.shape {
            Shape::Array(entries) => entries.get(index),
            _ => None,
        }
    }

    /// Total number of issues in this node and every descendant, per-key
    /// lists included.
    pub fn issue_count(&self) -> usize {
        let mut count = self.issues.len();
        match &self.shape {
            Shape::Leaf => {}
            Shape::Object(members) => {
                for slot in members.values() {
                    count += slot.issues.len();
                    count += slot.child.issue_count();
                }
            }
            Shape::Array(entries) => {
                for child in entries {
                    count += child.issue_count();
                }
            }
        }
        count
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    fn key_slot(&mut self, key: &str) -> &mut MemberSlot {
        if matches!(self.shape, Shape::Leaf) {
            self.shape = Shape::Object(BTreeMap::new());
        }
        match &mut self.shape {
            Shape::Object(members) => members.entry(key.to_string()).or_default(),
            _ => panic!("member access on a non-object issue node"),
        }
    }
}
