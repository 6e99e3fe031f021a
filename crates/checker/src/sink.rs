use concur_graph::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which checker produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckerKind {
    /// Call-graph context propagation (`//concur:` tags)
    Context,

    /// Lexical nesting (`//tag:` tags)
    Lexical,
}

impl CheckerKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            CheckerKind::Context => "context",
            CheckerKind::Lexical => "lexical",
        }
    }
}

impl fmt::Display for CheckerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub position: Position,
    pub message: String,
    pub checker: CheckerKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] {}", self.position, self.checker, self.message)
    }
}

/// Position-ordered diagnostics without duplicate (position, message) pairs
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every entry at or before the same position.
    /// Returns `false` when an identical diagnostic was already stored.
    pub fn insert(&mut self, diagnostic: Diagnostic) -> bool {
        let at = self
            .entries
            .partition_point(|d| d.position <= diagnostic.position);

        let duplicate = self.entries[..at]
            .iter()
            .rev()
            .take_while(|d| d.position == diagnostic.position)
            .any(|d| d.message == diagnostic.message);
        if duplicate {
            return false;
        }

        self.entries.insert(at, diagnostic);
        true
    }

    /// Ordered diagnostics; entries stay in the sink
    pub fn drain(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
