//! JSON exchange format for call graphs built by other resolvers.

use crate::builder::Program;
use crate::error::{GraphError, Result};
use crate::scope::SourceUnit;
use crate::types::{CallEdge, CallGraph, CallKind, EntityKey, Function, Position};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller: EntityKey,
    pub callee: EntityKey,
    #[serde(default = "default_kind")]
    pub kind: CallKind,
    pub position: Position,
}

fn default_kind() -> CallKind {
    CallKind::Direct
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub functions: Vec<Function>,

    #[serde(default)]
    pub calls: Vec<CallRecord>,

    /// Optional nesting information for the lexical checker
    #[serde(default)]
    pub units: Vec<SourceUnit>,
}

impl GraphDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Export a built program; calls keep their per-caller order
    pub fn from_program(program: &Program) -> Self {
        let graph = &program.graph;
        let functions = graph.functions().map(|(_, f)| f.clone()).collect();
        let calls = graph
            .functions()
            .flat_map(|(idx, caller)| {
                graph
                    .calls_from(idx)
                    .into_iter()
                    .map(move |(callee, edge)| CallRecord {
                        caller: caller.key.clone(),
                        callee: graph.function(callee).key.clone(),
                        kind: edge.kind,
                        position: edge.position.clone(),
                    })
            })
            .collect();

        Self {
            functions,
            calls,
            units: program.units.clone(),
        }
    }

    /// Validate references and assemble the program
    pub fn into_program(self) -> Result<Program> {
        let mut graph = CallGraph::new();
        let mut seen = HashSet::new();
        for function in self.functions {
            if !seen.insert(function.key.clone()) {
                return Err(GraphError::DuplicateFunction(function.key.to_string()));
            }
            graph.add_function(function);
        }

        for call in self.calls {
            let caller = graph
                .find(&call.caller)
                .ok_or_else(|| GraphError::UnknownFunction(call.caller.to_string()))?;
            let callee = graph
                .find(&call.callee)
                .ok_or_else(|| GraphError::UnknownFunction(call.callee.to_string()))?;
            graph.add_call(
                caller,
                callee,
                CallEdge {
                    kind: call.kind,
                    position: call.position,
                },
            );
        }

        log::info!(
            "Loaded call graph document: {} functions, {} calls",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Program {
            graph,
            units: self.units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FunctionRole, Origin};
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "functions": [
            {"key": "m::main", "name": "main", "role": "entry"},
            {"key": "m::worker", "name": "worker", "doc": ["//concur:worker"]},
            {"key": "extern::log", "name": "log", "origin": "external"}
        ],
        "calls": [
            {"caller": "m::main", "callee": "m::worker", "kind": "spawn",
             "position": {"file": "m.rs", "line": 3, "column": 5}},
            {"caller": "m::worker", "callee": "extern::log",
             "position": {"file": "m.rs", "line": 8, "column": 9}}
        ]
    }"#;

    #[test]
    fn loads_functions_and_calls() {
        let program = GraphDocument::from_json(DOC).unwrap().into_program().unwrap();
        let graph = &program.graph;
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);

        let main = graph.find(&"m::main".into()).unwrap();
        assert_eq!(graph.function(main).role, FunctionRole::Entry);
        let worker = graph.find(&"m::worker".into()).unwrap();
        assert_eq!(graph.function(worker).doc, vec!["//concur:worker".to_string()]);
        let log = graph.find(&"extern::log".into()).unwrap();
        assert_eq!(graph.function(log).origin, Origin::External);

        let (_, edge) = graph.calls_from(worker)[0];
        assert_eq!(edge.kind, CallKind::Direct);
    }

    #[test]
    fn rejects_unknown_callee() {
        let json = r#"{
            "functions": [{"key": "m::main"}],
            "calls": [{"caller": "m::main", "callee": "m::missing",
                       "position": {"file": "m.rs", "line": 1, "column": 1}}]
        }"#;
        let err = GraphDocument::from_json(json).unwrap().into_program().unwrap_err();
        assert!(matches!(err, GraphError::UnknownFunction(key) if key == "m::missing"));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let json = r#"{"functions": [{"key": "m::a"}, {"key": "m::a"}]}"#;
        let err = GraphDocument::from_json(json).unwrap().into_program().unwrap_err();
        assert!(matches!(err, GraphError::DuplicateFunction(_)));
    }

    #[test]
    fn export_preserves_call_order() {
        let program = GraphDocument::from_json(DOC).unwrap().into_program().unwrap();
        let exported = GraphDocument::from_program(&program);
        let callees: Vec<&str> = exported.calls.iter().map(|c| c.callee.as_str()).collect();
        assert_eq!(callees, vec!["m::worker", "extern::log"]);
    }
}
