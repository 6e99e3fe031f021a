use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identity of a function across source files and runs
/// (e.g. "src/worker.rs::Pool::run", "src/main.rs::main$1", "extern::std::thread::spawn")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Source location; ordered by file, then line, then column
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub file: String,

    /// 1-based line
    pub line: usize,

    /// 1-based column (bytes)
    pub column: usize,
}

impl Position {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Where a function's body lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Analyzed program code
    #[default]
    Program,

    /// Opaque library code: never checked, never descended into
    External,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionRole {
    /// Program entry point
    Entry,

    /// Module initializer (runs before the entry point)
    Initializer,

    /// Ordinary named function or method
    #[default]
    Declared,

    /// Anonymous function literal (closure)
    Literal,
}

impl FunctionRole {
    /// Roots of the context traversal
    pub fn is_root(self) -> bool {
        matches!(self, FunctionRole::Entry | FunctionRole::Initializer)
    }
}

/// Node in the call graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub key: EntityKey,

    /// Declared name (e.g. "run", "Pool::run", "main$1"); may be empty
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub origin: Origin,

    #[serde(default)]
    pub role: FunctionRole,

    /// Declaration site, if known
    #[serde(default)]
    pub position: Option<Position>,

    /// Raw comment lines attached to the declaration, in source order
    #[serde(default)]
    pub doc: Vec<String>,
}

impl Function {
    pub fn program(key: impl Into<String>, name: impl Into<String>, role: FunctionRole) -> Self {
        Self {
            key: EntityKey::new(key),
            name: name.into(),
            origin: Origin::Program,
            role,
            position: None,
            doc: Vec::new(),
        }
    }

    pub fn external(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: EntityKey::new(key),
            name: name.into(),
            origin: Origin::External,
            role: FunctionRole::Declared,
            position: None,
            doc: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_doc<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_external(&self) -> bool {
        self.origin == Origin::External
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Ordinary call: continues the caller's unit of work
    Direct,

    /// Starts a new concurrent unit of work running the callee
    Spawn,
}

/// Edge in the call graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub kind: CallKind,
    pub position: Position,
}

impl CallEdge {
    pub fn direct(position: Position) -> Self {
        Self {
            kind: CallKind::Direct,
            position,
        }
    }

    pub fn spawn(position: Position) -> Self {
        Self {
            kind: CallKind::Spawn,
            position,
        }
    }
}

/// Whole-program call graph
#[derive(Debug, Clone)]
pub struct CallGraph {
    /// Directed graph (caller -> callee)
    pub graph: DiGraph<Function, CallEdge>,

    /// Entity key -> NodeIndex mapping for fast lookup
    pub key_index: HashMap<EntityKey, NodeIndex>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            key_index: HashMap::new(),
        }
    }

    /// Add function to graph; a function already present under the same key is kept
    pub fn add_function(&mut self, function: Function) -> NodeIndex {
        if let Some(&idx) = self.key_index.get(&function.key) {
            return idx;
        }
        let key = function.key.clone();
        let idx = self.graph.add_node(function);
        self.key_index.insert(key, idx);
        idx
    }

    /// Add call between functions
    pub fn add_call(&mut self, caller: NodeIndex, callee: NodeIndex, edge: CallEdge) -> EdgeIndex {
        self.graph.add_edge(caller, callee, edge)
    }

    pub fn find(&self, key: &EntityKey) -> Option<NodeIndex> {
        self.key_index.get(key).copied()
    }

    pub fn function(&self, idx: NodeIndex) -> &Function {
        &self.graph[idx]
    }

    /// All functions in insertion order
    pub fn functions(&self) -> impl Iterator<Item = (NodeIndex, &Function)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx, &self.graph[idx]))
    }

    /// Entry point and initializers, in insertion order
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.functions()
            .filter(|(_, f)| !f.is_external() && f.role.is_root())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Outgoing calls in the order they were added
    pub fn calls_from(&self, caller: NodeIndex) -> Vec<(NodeIndex, &CallEdge)> {
        let mut edges: Vec<_> = self.graph.edges(caller).collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| (e.target(), e.weight())).collect()
    }

    /// First (in insertion order) spawn edge targeting `callee`
    pub fn first_spawn_into(&self, callee: NodeIndex) -> Option<(NodeIndex, &CallEdge)> {
        self.graph
            .edges_directed(callee, Direction::Incoming)
            .filter(|e| e.weight().kind == CallKind::Spawn)
            .min_by_key(|e| e.id())
            .map(|e| (e.source(), e.weight()))
    }

    /// Whether any analyzed-program function exists (otherwise there is nothing to traverse)
    pub fn has_program_functions(&self) -> bool {
        self.graph.node_weights().any(|f| !f.is_external())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for CallGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pos(line: usize) -> Position {
        Position::new("main.rs", line, 1)
    }

    #[test]
    fn positions_order_by_file_then_line_then_column() {
        let mut positions = vec![
            Position::new("b.rs", 1, 1),
            Position::new("a.rs", 2, 1),
            Position::new("a.rs", 1, 9),
            Position::new("a.rs", 1, 2),
        ];
        positions.sort();
        let rendered: Vec<String> = positions.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["a.rs:1:2", "a.rs:1:9", "a.rs:2:1", "b.rs:1:1"]);
    }

    #[test]
    fn add_function_is_idempotent_per_key() {
        let mut graph = CallGraph::new();
        let a = graph.add_function(Function::program("m::a", "a", FunctionRole::Declared));
        let again = graph.add_function(Function::program("m::a", "other", FunctionRole::Entry));
        assert_eq!(a, again);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.function(a).name, "a");
    }

    #[test]
    fn calls_from_keeps_insertion_order() {
        let mut graph = CallGraph::new();
        let main = graph.add_function(Function::program("m::main", "main", FunctionRole::Entry));
        let a = graph.add_function(Function::program("m::a", "a", FunctionRole::Declared));
        let b = graph.add_function(Function::program("m::b", "b", FunctionRole::Declared));
        graph.add_call(main, a, CallEdge::direct(pos(2)));
        graph.add_call(main, b, CallEdge::spawn(pos(3)));
        graph.add_call(main, a, CallEdge::direct(pos(4)));

        let targets: Vec<_> = graph
            .calls_from(main)
            .into_iter()
            .map(|(idx, edge)| (idx, edge.position.line))
            .collect();
        assert_eq!(targets, vec![(a, 2), (b, 3), (a, 4)]);
    }

    #[test]
    fn first_spawn_into_picks_earliest_edge() {
        let mut graph = CallGraph::new();
        let main = graph.add_function(Function::program("m::main", "main", FunctionRole::Entry));
        let other = graph.add_function(Function::program("m::other", "other", FunctionRole::Declared));
        let worker = graph.add_function(Function::program("m::worker", "worker", FunctionRole::Declared));
        graph.add_call(main, worker, CallEdge::direct(pos(1)));
        graph.add_call(other, worker, CallEdge::spawn(pos(7)));
        graph.add_call(main, worker, CallEdge::spawn(pos(3)));

        let (caller, edge) = graph.first_spawn_into(worker).unwrap();
        assert_eq!(caller, other);
        assert_eq!(edge.position.line, 7);
        assert!(graph.first_spawn_into(main).is_none());
    }

    #[test]
    fn roots_skip_external_and_plain_functions() {
        let mut graph = CallGraph::new();
        graph.add_function(Function::external("extern::init", "init"));
        let init = graph.add_function(Function::program("m::setup", "setup", FunctionRole::Initializer));
        graph.add_function(Function::program("m::a", "a", FunctionRole::Declared));
        let main = graph.add_function(Function::program("m::main", "main", FunctionRole::Entry));
        assert_eq!(graph.roots(), vec![init, main]);
        assert!(graph.has_program_functions());
        assert!(!CallGraph::new().has_program_functions());
    }
}
