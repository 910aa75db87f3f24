//! Offset instrumentation.
//!
//! Each top-level executable statement of a fragment gets a tracking call
//! inserted in front of it, so a runtime failure can be mapped back to the
//! statement that was executing. Offsets always refer to the original,
//! uninstrumented text.

use crate::target::FragmentKind;
use crate::template::{HELPER_CLASS, TRACK_METHOD};
use crate::utils::unicode::{char_len, char_to_byte_index};

pub mod outline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Class { name: String },
    Method { name: String },
    /// A `{ ... }` statement container.
    Block,
    Statement,
}

/// One node of a fragment's statement tree. `start` is a character offset
/// into the raw fragment text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub start: Option<usize>,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, start: Option<usize>) -> Self {
        Self { kind, start, children: Vec::new() }
    }

    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }
}

/// Whether a node belongs to the injected helper code and must not be
/// walked: the helper class itself or the tracking method.
pub fn is_helper(node: &SyntaxNode) -> bool {
    match &node.kind {
        NodeKind::Class { name } => name == HELPER_CLASS,
        NodeKind::Method { name } => name == TRACK_METHOD,
        _ => false,
    }
}

/// Collect the start offsets of every eligible statement, in document order.
///
/// Blocks are walked but not collected; nodes matching `skip` end the walk
/// for their whole subtree.
pub fn statement_offsets(root: &SyntaxNode, skip: &dyn Fn(&SyntaxNode) -> bool) -> Vec<usize> {
    fn visit(node: &SyntaxNode, skip: &dyn Fn(&SyntaxNode) -> bool, out: &mut Vec<usize>) {
        if skip(node) {
            return;
        }
        if node.kind == NodeKind::Statement {
            if let Some(start) = node.start {
                out.push(start);
            }
        }
        for child in &node.children {
            visit(child, skip, out);
        }
    }

    let mut out = Vec::new();
    visit(root, skip, &mut out);
    out.sort_unstable();
    out.dedup();
    out
}

pub fn tracking_call(offset: usize) -> String {
    format!("{}({});", TRACK_METHOD, offset)
}

/// Apply insertions in a single left-to-right pass. Positions are character
/// offsets into `text` and must be non-decreasing.
pub fn insert_sequential(text: &str, inserts: &[(usize, String)]) -> String {
    let extra: usize = inserts.iter().map(|(_, s)| s.len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    let mut prev_char = 0usize;
    let mut prev_byte = 0usize;
    for (offset, insert) in inserts {
        assert!(
            *offset >= prev_char,
            "insertions must be sorted by original offset ({} after {})",
            offset,
            prev_char
        );
        let byte = prev_byte + char_to_byte_index(&text[prev_byte..], offset - prev_char);
        out.push_str(&text[prev_byte..byte]);
        out.push_str(insert);
        prev_char = *offset;
        prev_byte = byte;
    }
    out.push_str(&text[prev_byte..]);
    out
}

/// Result of instrumenting a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    pub text: String,
    pub offsets: Vec<usize>,
}

/// Insert a tracking call before every eligible statement of `tree`.
pub fn instrument(text: &str, tree: &SyntaxNode) -> Instrumented {
    let limit = char_len(text);
    let offsets: Vec<usize> = statement_offsets(tree, &is_helper)
        .into_iter()
        .filter(|o| *o <= limit)
        .collect();
    let inserts: Vec<(usize, String)> = offsets.iter().map(|o| (*o, tracking_call(*o))).collect();
    tracing::debug!(statements = offsets.len(), "instrumented fragment");
    Instrumented { text: insert_sequential(text, &inserts), offsets }
}

/// Parse `text` with the outline parser and instrument it. Only statement
/// lists and programs carry statements of their own; other kinds come back
/// unchanged.
pub fn instrument_source(text: &str, kind: FragmentKind) -> Instrumented {
    let tree = match kind {
        FragmentKind::Statements => outline::parse_statements(text),
        FragmentKind::Program => outline::parse_members(text),
        FragmentKind::Expression | FragmentKind::SourceFile | FragmentKind::StyleSheet => {
            SyntaxNode::new(NodeKind::Root, None)
        }
    };
    instrument(text, &tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(start: usize) -> SyntaxNode {
        SyntaxNode::new(NodeKind::Statement, Some(start))
    }

    #[test]
    fn blocks_are_walked_but_not_counted() {
        let tree = SyntaxNode::new(NodeKind::Root, None).with_children(vec![
            stmt(0),
            stmt(10).with_children(vec![SyntaxNode::new(NodeKind::Block, Some(20))
                .with_children(vec![stmt(22), stmt(30)])]),
            SyntaxNode::new(NodeKind::Statement, None),
        ]);
        assert_eq!(statement_offsets(&tree, &is_helper), vec![0, 10, 22, 30]);
    }

    #[test]
    fn helper_subtrees_are_skipped() {
        let helper_method = SyntaxNode::new(NodeKind::Method { name: TRACK_METHOD.into() }, Some(50))
            .with_children(vec![SyntaxNode::new(NodeKind::Block, Some(60)).with_children(vec![stmt(62)])]);
        let helper_class = SyntaxNode::new(NodeKind::Class { name: HELPER_CLASS.into() }, Some(100))
            .with_children(vec![stmt(120)]);
        let tree = SyntaxNode::new(NodeKind::Root, None)
            .with_children(vec![stmt(5), helper_method, helper_class, stmt(200)]);
        assert_eq!(statement_offsets(&tree, &is_helper), vec![5, 200]);
    }

    #[test]
    fn insertions_use_original_offsets() {
        let text = "a();b();c();";
        let out = instrument(
            text,
            &SyntaxNode::new(NodeKind::Root, None).with_children(vec![stmt(0), stmt(4), stmt(8)]),
        );
        assert_eq!(
            out.text,
            "____TrackStatementOffset(0);a();____TrackStatementOffset(4);b();____TrackStatementOffset(8);c();"
        );
        assert_eq!(out.offsets, vec![0, 4, 8]);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let text = "s(\"é\");t();";
        let out = insert_sequential(text, &[(7, "#".into())]);
        assert_eq!(out, "s(\"é\");#t();");
    }

    #[test]
    fn empty_fragment_is_unchanged() {
        let out = instrument_source("", FragmentKind::Statements);
        assert_eq!(out.text, "");
        assert!(out.offsets.is_empty());
    }

    #[test]
    fn expressions_are_never_instrumented() {
        let out = instrument_source("DateTime.Now", FragmentKind::Expression);
        assert_eq!(out.text, "DateTime.Now");
        assert!(out.offsets.is_empty());
    }

    #[test]
    fn statement_fragment_round_trip() {
        let text = "var a = 1;\nFoo(a);";
        let out = instrument_source(text, FragmentKind::Statements);
        assert_eq!(out.offsets, vec![0, 11]);
        assert_eq!(
            out.text,
            "____TrackStatementOffset(0);var a = 1;\n____TrackStatementOffset(11);Foo(a);"
        );
    }

    #[test]
    #[should_panic(expected = "sorted")]
    fn unsorted_insertions_are_a_bug() {
        insert_sequential("abcdef", &[(4, "x".into()), (2, "y".into())]);
    }
}
