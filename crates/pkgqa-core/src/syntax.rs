//! Syntax trees attached to versions by parse-injecting sources.
//!
//! The grammar itself belongs to the parsing layer; the engine only needs an
//! owned tree it can hand to checks and a parser it can call lazily.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// An owned node of a concrete syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub kind: String,
    pub bytes: Range<usize>,
    #[serde(default)]
    pub children: Vec<SyntaxTree>,
}

impl SyntaxTree {
    #[must_use]
    pub fn leaf(kind: impl Into<String>, bytes: Range<usize>) -> Self {
        Self {
            kind: kind.into(),
            bytes,
            children: Vec::new(),
        }
    }

    /// Depth-first iterator over this node and all of its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &Self> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Source text covered by this node.
    #[must_use]
    pub fn text<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        data.get(self.bytes.clone()).unwrap_or_default()
    }
}

/// Parser collaborator used by parse-injecting sources.
pub trait SyntaxParser: Send + Sync + fmt::Debug {
    /// Parse raw file bytes into a tree, or describe why it failed.
    fn parse(&self, data: &[u8]) -> Result<SyntaxTree, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_preorder() {
        let tree = SyntaxTree {
            kind: "program".into(),
            bytes: 0..10,
            children: vec![
                SyntaxTree {
                    kind: "function".into(),
                    bytes: 0..5,
                    children: vec![SyntaxTree::leaf("word", 0..3)],
                },
                SyntaxTree::leaf("comment", 6..10),
            ],
        };
        let kinds: Vec<&str> = tree.walk().map(|n| n.kind.as_str()).collect();
        assert_eq!(kinds, ["program", "function", "word", "comment"]);
    }

    #[test]
    fn text_out_of_range_is_empty() {
        let node = SyntaxTree::leaf("word", 4..40);
        assert_eq!(node.text(b"abc"), b"");
        assert_eq!(SyntaxTree::leaf("w", 0..2).text(b"abc"), b"ab");
    }
}
