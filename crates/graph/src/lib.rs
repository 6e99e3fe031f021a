//! # Concur Graph
//!
//! Whole-program call graphs annotated with concurrency structure.
//!
//! ## Features
//!
//! - **Call graph model** - functions, closures and opaque library functions linked by
//!   direct calls and spawns
//! - **Rust frontend** - tree-sitter based builder that resolves calls across files
//! - **Scope trees** - static nesting of declarations and closures with their comments
//! - **JSON documents** - exchange graphs produced by other resolvers
//!
//! ## Architecture
//!
//! ```text
//! Rust sources                      graph.json
//!     │                                 │
//!     ├──> ProgramBuilder               └──> GraphDocument
//!     │      ├─ Phase 1: declarations,         ├─ validate references
//!     │      │   doc comments, roles           └─ assemble Program
//!     │      └─ Phase 2: calls, spawns,
//!     │          closures, scope trees
//!     │
//!     └──> Program
//!            ├─ CallGraph (petgraph): Direct / Spawn edges with positions
//!            └─ SourceUnit[]: comment groups + nested scopes
//! ```

mod builder;
mod document;
mod error;
mod scope;
mod types;

pub use builder::{BuildOptions, Program, ProgramBuilder, EXTERNAL_PREFIX};
pub use document::{CallRecord, GraphDocument};
pub use error::{GraphError, Result};
pub use scope::{CommentGroup, Scope, ScopeCall, ScopeKind, SourceUnit};
pub use types::{
    CallEdge, CallGraph, CallKind, EntityKey, Function, FunctionRole, Origin, Position,
};
pub use petgraph::graph::NodeIndex;
