//! Metadata attachments and debug locations.
//!
//! Attachments are the only channel of inter-pass communication: a pass
//! binds a `MetadataNode` to an instruction, terminator, function, or
//! global under a string key, and a later pass reads it back by key.
//! The node shapes the pipeline relies on (`unsafe_line_info`,
//! `unsafe_count.func_id`) have typed accessors that report malformed
//! layouts instead of guessing.

use thiserror::Error;

/// Presence-only marker set by the front-end on instructions that
/// originate inside an unsafe region.
pub const UNSAFE_INST: &str = "unsafe_inst";
/// `{i32 line, string file}` captured by the marker-planting pass so the
/// location survives later debug-info stripping.
pub const UNSAFE_LINE_INFO: &str = "unsafe_line_info";
/// `{i32}` dense function id assigned by the function tracker.
pub const FUNC_ID: &str = "unsafe_count.func_id";
/// Node listing every valid debug location in the module, attached to the
/// anchor global.
pub const PRESERVED_DEBUGINFO: &str = "preserved.debuginfo";

/// A source location attached to an instruction by the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLoc {
    pub file: String,
    pub line: u32,
    pub col: u32,
    /// Enclosing scope name. Empty means no scope (an invalid location).
    pub scope: String,
}

impl DebugLoc {
    pub fn new(file: &str, line: u32, col: u32, scope: &str) -> Self {
        Self { file: file.to_string(), line, col, scope: scope.to_string() }
    }

    /// A location qualifies for the debug-info anchor only when all four
    /// fields are present: non-empty scope and file, positive line and
    /// column.
    pub fn is_valid(&self) -> bool {
        !self.scope.is_empty() && !self.file.is_empty() && self.line > 0 && self.col > 0
    }
}

/// Error produced when a metadata node does not have the layout its key
/// implies. Callers refuse the affected site and leave the rest of the
/// module alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("metadata node has {found} operands, expected {expected}")]
    WrongArity { expected: usize, found: usize },
    #[error("metadata operand {index} has the wrong kind")]
    WrongKind { index: usize },
}

/// One operand of a metadata node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOp {
    I32(u32),
    Str(String),
    Loc(DebugLoc),
    Node(MetadataNode),
}

/// An ordered list of metadata operands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataNode(pub Vec<MetadataOp>);

impl MetadataNode {
    /// Build an `unsafe_line_info` node: `{i32 line, string file}`.
    pub fn line_info(line: u32, file: &str) -> Self {
        MetadataNode(vec![MetadataOp::I32(line), MetadataOp::Str(file.to_string())])
    }

    /// Build an `unsafe_count.func_id` node: `{i32}`.
    pub fn func_id(id: u32) -> Self {
        MetadataNode(vec![MetadataOp::I32(id)])
    }

    /// Read this node as `{i32 line, string file}`.
    pub fn as_line_info(&self) -> Result<(u32, &str), MetadataError> {
        if self.0.len() < 2 {
            return Err(MetadataError::WrongArity { expected: 2, found: self.0.len() });
        }
        let line = match &self.0[0] {
            MetadataOp::I32(line) => *line,
            _ => return Err(MetadataError::WrongKind { index: 0 }),
        };
        let file = match &self.0[1] {
            MetadataOp::Str(file) => file.as_str(),
            _ => return Err(MetadataError::WrongKind { index: 1 }),
        };
        Ok((line, file))
    }

    /// Read this node as `{i32}`.
    pub fn as_func_id(&self) -> Result<u32, MetadataError> {
        match self.0.first() {
            Some(MetadataOp::I32(id)) => Ok(*id),
            Some(_) => Err(MetadataError::WrongKind { index: 0 }),
            None => Err(MetadataError::WrongArity { expected: 1, found: 0 }),
        }
    }
}

/// String-keyed metadata attachments on an IR entity.
///
/// Backed by a plain vector: almost every entity carries zero or one
/// attachment, so a map would be all overhead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attachments(Vec<(String, MetadataNode)>);

impl Attachments {
    pub fn new() -> Self {
        Attachments(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&MetadataNode> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, node)| node)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Bind `node` under `key`, replacing any existing binding.
    pub fn set(&mut self, key: &str, node: MetadataNode) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = node,
            None => self.0.push((key.to_string(), node)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_info_round_trip() {
        let node = MetadataNode::line_info(42, "a.rs");
        assert_eq!(node.as_line_info(), Ok((42, "a.rs")));
    }

    #[test]
    fn malformed_line_info_is_rejected() {
        let node = MetadataNode(vec![MetadataOp::Str("a.rs".into())]);
        assert_eq!(
            node.as_line_info(),
            Err(MetadataError::WrongArity { expected: 2, found: 1 })
        );
        let node = MetadataNode(vec![MetadataOp::Str("a.rs".into()), MetadataOp::I32(42)]);
        assert_eq!(node.as_line_info(), Err(MetadataError::WrongKind { index: 0 }));
    }

    #[test]
    fn attachments_replace_on_set() {
        let mut att = Attachments::new();
        att.set(FUNC_ID, MetadataNode::func_id(1));
        att.set(FUNC_ID, MetadataNode::func_id(2));
        assert_eq!(att.get(FUNC_ID).unwrap().as_func_id(), Ok(2));
    }

    #[test]
    fn debug_loc_validity() {
        assert!(DebugLoc::new("a.rs", 1, 1, "main").is_valid());
        assert!(!DebugLoc::new("", 1, 1, "main").is_valid());
        assert!(!DebugLoc::new("a.rs", 0, 1, "main").is_valid());
        assert!(!DebugLoc::new("a.rs", 1, 0, "main").is_valid());
        assert!(!DebugLoc::new("a.rs", 1, 1, "").is_valid());
    }
}
