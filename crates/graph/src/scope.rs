//! Static nesting of declarations and literals, as consumed by the lexical checker.

use crate::types::{EntityKey, Position};
use serde::{Deserialize, Serialize};

/// Consecutive `//` comment lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentGroup {
    /// 1-based line of the first comment
    pub start_line: usize,

    /// 1-based line of the last comment
    pub end_line: usize,

    /// Comment texts including the leading `//`
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScopeKind {
    /// Named declaration; its tags come from the declaration's own facts
    Declaration { key: EntityKey },

    /// Anonymous literal; its tags come from comments at or above its first line
    Literal,
}

/// Statically named call inside a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeCall {
    /// Callee as written at the call site
    pub name: String,

    /// Resolved program function, if any
    #[serde(default)]
    pub callee: Option<EntityKey>,

    pub position: Position,
}

/// Function declaration or literal with the calls and scopes directly nested in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(flatten)]
    pub kind: ScopeKind,

    /// 1-based line where the declaration or literal starts
    pub start_line: usize,

    #[serde(default)]
    pub calls: Vec<ScopeCall>,

    #[serde(default)]
    pub children: Vec<Scope>,
}

impl Scope {
    pub fn declaration(key: EntityKey, start_line: usize) -> Self {
        Self {
            kind: ScopeKind::Declaration { key },
            start_line,
            calls: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn literal(start_line: usize) -> Self {
        Self {
            kind: ScopeKind::Literal,
            start_line,
            calls: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// One source file: its comments and its top-level scopes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: String,

    #[serde(default)]
    pub comments: Vec<CommentGroup>,

    #[serde(default)]
    pub scopes: Vec<Scope>,
}

impl SourceUnit {
    /// Comment groups ending on `line` or on the line directly above it
    pub fn comments_near(&self, line: usize) -> impl Iterator<Item = &CommentGroup> {
        self.comments
            .iter()
            .filter(move |group| group.end_line == line || group.end_line + 1 == line)
    }
}
