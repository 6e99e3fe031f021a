//! Context propagation over the whole-program call graph.
//!
//! Every call is checked under the context it runs in: the root's context for code
//! reached by direct calls from an entry point or initializer, and the spawned
//! function's own context for code reached through a spawn.

use crate::annotations::{Annotations, Tags};
use crate::rule::{is_negative, match_rule, Verdict};
use crate::sink::{CheckerKind, Diagnostic, DiagnosticSink};
use concur_graph::{CallGraph, CallKind, NodeIndex, Position};

/// Pending visit of one call edge
#[derive(Debug, Clone)]
struct Frame {
    callee: NodeIndex,
    position: Position,
    /// Direct-call chain since the last spawn
    call_path: Vec<NodeIndex>,
    /// Spawners and spawn targets along the nested-spawn lineage
    spawn_path: Vec<NodeIndex>,
    context: String,
}

/// Counters from one engine run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub roots: usize,
    pub seeded: usize,
    pub visits: usize,
}

pub struct ContextPropagationEngine<'a> {
    graph: &'a CallGraph,
    annotations: &'a Annotations,
    entry_context: &'a str,
}

impl<'a> ContextPropagationEngine<'a> {
    pub fn new(graph: &'a CallGraph, annotations: &'a Annotations, entry_context: &'a str) -> Self {
        Self {
            graph,
            annotations,
            entry_context,
        }
    }

    /// Traverse from every root and every spawn target, in node order
    pub fn run(&self, sink: &mut DiagnosticSink) -> EngineStats {
        let mut stats = EngineStats::default();

        for root in self.graph.roots() {
            stats.roots += 1;
            let frame = Frame {
                callee: root,
                position: self.graph.function(root).position.clone().unwrap_or_default(),
                call_path: Vec::new(),
                spawn_path: Vec::new(),
                context: self.root_context(root),
            };
            stats.visits += self.traverse(frame, sink);
        }

        // Spawn targets also start from their first spawn site
        for (idx, function) in self.graph.functions() {
            if function.is_external() || function.role.is_root() {
                continue;
            }
            if let Some((_, edge)) = self.graph.first_spawn_into(idx) {
                stats.seeded += 1;
                let frame = Frame {
                    callee: idx,
                    position: edge.position.clone(),
                    call_path: Vec::new(),
                    spawn_path: Vec::new(),
                    context: self.concur_name(idx),
                };
                stats.visits += self.traverse(frame, sink);
            }
        }

        log::info!(
            "Context check: {} roots, {} spawned functions, {} call visits, {} diagnostics",
            stats.roots,
            stats.seeded,
            stats.visits,
            sink.len()
        );
        stats
    }

    /// Context a root starts in: its first tag, or the shared entry context
    pub fn root_context(&self, root: NodeIndex) -> String {
        let function = self.graph.function(root);
        self.annotations
            .lookup(&function.key)
            .first()
            .cloned()
            .unwrap_or_else(|| self.entry_context.to_string())
    }

    /// Context a spawned function runs in: its first positive tag, or its own name
    pub fn concur_name(&self, target: NodeIndex) -> String {
        let function = self.graph.function(target);
        match self.annotations.lookup(&function.key).first() {
            Some(tag) if !is_negative(tag) => tag.clone(),
            _ => function.name.clone(),
        }
    }

    /// Depth-first walk from one edge; returns the number of edges visited
    fn traverse(&self, start: Frame, sink: &mut DiagnosticSink) -> usize {
        let mut visits = 0;
        let mut stack = vec![start];

        while let Some(frame) = stack.pop() {
            visits += 1;
            let function = self.graph.function(frame.callee);

            if function.is_external() {
                continue;
            }

            let tags = self.annotations.lookup(&function.key);
            self.check(&frame, &function.name, tags, sink);

            if frame.call_path.contains(&frame.callee) {
                log::debug!("{}: recursion into {} stops here", frame.position, function.name);
                continue;
            }

            let mut call_path = frame.call_path;
            call_path.push(frame.callee);

            let mut children = Vec::new();
            for (target, edge) in self.graph.calls_from(frame.callee) {
                match edge.kind {
                    CallKind::Direct => children.push(Frame {
                        callee: target,
                        position: edge.position.clone(),
                        call_path: call_path.clone(),
                        spawn_path: frame.spawn_path.clone(),
                        context: frame.context.clone(),
                    }),
                    CallKind::Spawn => {
                        if frame.spawn_path.contains(&target) {
                            continue;
                        }
                        let mut spawn_path = frame.spawn_path.clone();
                        spawn_path.push(frame.callee);
                        spawn_path.push(target);
                        children.push(Frame {
                            callee: target,
                            position: edge.position.clone(),
                            call_path: Vec::new(),
                            spawn_path,
                            context: self.concur_name(target),
                        });
                    }
                }
            }

            // Reversed so edges are visited in call order
            stack.extend(children.into_iter().rev());
        }

        visits
    }

    fn check(&self, frame: &Frame, name: &str, tags: &Tags, sink: &mut DiagnosticSink) {
        if match_rule(&frame.context, tags) == Verdict::Allow {
            return;
        }

        sink.insert(Diagnostic {
            position: frame.position.clone(),
            message: format!(
                "function {name} called from wrong context; {} does not match {tags}",
                frame.context
            ),
            checker: CheckerKind::Context,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationStore, TagMarker};
    use concur_graph::{CallEdge, Function, FunctionRole};
    use pretty_assertions::assert_eq;

    struct Fixture {
        graph: CallGraph,
        line: usize,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: CallGraph::new(),
                line: 0,
            }
        }

        fn func(&mut self, name: &str, role: FunctionRole, tags: &str) -> NodeIndex {
            let mut function = Function::program(format!("t::{name}"), name, role);
            if !tags.is_empty() {
                function = function.with_doc([format!("//concur:{tags}")]);
            }
            self.graph.add_function(function)
        }

        fn call(&mut self, from: NodeIndex, to: NodeIndex, kind: CallKind) -> usize {
            self.line += 1;
            let position = Position::new("t.rs", self.line, 1);
            let edge = match kind {
                CallKind::Direct => CallEdge::direct(position),
                CallKind::Spawn => CallEdge::spawn(position),
            };
            self.graph.add_call(from, to, edge);
            self.line
        }

        fn run(&self) -> (Vec<(usize, String)>, EngineStats) {
            let mut store = AnnotationStore::new();
            store.scan(&TagMarker::new("//concur:"), self.graph.functions().map(|(_, f)| f));
            let annotations = store.seal();
            let engine = ContextPropagationEngine::new(&self.graph, &annotations, "main");
            let mut sink = DiagnosticSink::new();
            let stats = engine.run(&mut sink);
            let diags = sink
                .into_vec()
                .into_iter()
                .map(|d| (d.position.line, d.message))
                .collect();
            (diags, stats)
        }
    }

    #[test]
    fn root_context_defaults_to_entry_context() {
        let mut fx = Fixture::new();
        let main = fx.func("main", FunctionRole::Entry, "");
        let init = fx.func("init", FunctionRole::Initializer, "boot");
        let mut store = AnnotationStore::new();
        store.scan(&TagMarker::new("//concur:"), fx.graph.functions().map(|(_, f)| f));
        let annotations = store.seal();
        let engine = ContextPropagationEngine::new(&fx.graph, &annotations, "main");
        assert_eq!(engine.root_context(main), "main");
        assert_eq!(engine.root_context(init), "boot");
    }

    #[test]
    fn concur_name_skips_negative_first_tag() {
        let mut fx = Fixture::new();
        let worker = fx.func("worker", FunctionRole::Declared, "pool,main");
        let guarded = fx.func("guarded", FunctionRole::Declared, "!main");
        let plain = fx.func("plain", FunctionRole::Declared, "");
        let mut store = AnnotationStore::new();
        store.scan(&TagMarker::new("//concur:"), fx.graph.functions().map(|(_, f)| f));
        let annotations = store.seal();
        let engine = ContextPropagationEngine::new(&fx.graph, &annotations, "main");
        assert_eq!(engine.concur_name(worker), "pool");
        assert_eq!(engine.concur_name(guarded), "guarded");
        assert_eq!(engine.concur_name(plain), "plain");
    }

    #[test]
    fn violation_does_not_stop_descent() {
        let mut fx = Fixture::new();
        let main = fx.func("main", FunctionRole::Entry, "");
        let ui = fx.func("ui", FunctionRole::Declared, "ui");
        let render = fx.func("render", FunctionRole::Declared, "ui");
        let first = fx.call(main, ui, CallKind::Direct);
        let second = fx.call(ui, render, CallKind::Direct);

        let (diags, _) = fx.run();
        assert_eq!(
            diags,
            vec![
                (first, "function ui called from wrong context; main does not match [ui]".to_string()),
                (second, "function render called from wrong context; main does not match [ui]".to_string()),
            ]
        );
    }

    #[test]
    fn spawn_switches_context() {
        let mut fx = Fixture::new();
        let main = fx.func("main", FunctionRole::Entry, "");
        let worker = fx.func("worker", FunctionRole::Declared, "pool");
        let main_only = fx.func("main_only", FunctionRole::Declared, "main");
        fx.call(main, worker, CallKind::Spawn);
        let bad = fx.call(worker, main_only, CallKind::Direct);
        fx.call(main, main_only, CallKind::Direct);

        let (diags, stats) = fx.run();
        assert_eq!(
            diags,
            vec![(bad, "function main_only called from wrong context; pool does not match [main]".to_string())]
        );
        assert_eq!(stats.roots, 1);
        assert_eq!(stats.seeded, 1);
    }

    #[test]
    fn external_callees_are_never_checked() {
        let mut fx = Fixture::new();
        let main = fx.func("main", FunctionRole::Entry, "");
        let lib = fx.graph.add_function(
            Function::external("extern::lib::call", "lib::call").with_doc(["//concur:never"]),
        );
        let ui = fx.func("ui", FunctionRole::Declared, "ui");
        fx.call(main, lib, CallKind::Direct);
        fx.call(lib, ui, CallKind::Direct);

        let (diags, _) = fx.run();
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    }

    #[test]
    fn direct_recursion_terminates_and_reports_once() {
        let mut fx = Fixture::new();
        let main = fx.func("main", FunctionRole::Entry, "");
        let a = fx.func("a", FunctionRole::Declared, "");
        let b = fx.func("b", FunctionRole::Declared, "worker");
        fx.call(main, a, CallKind::Direct);
        fx.call(a, a, CallKind::Direct);
        let site = fx.call(a, b, CallKind::Direct);
        fx.call(b, a, CallKind::Direct);

        let (diags, _) = fx.run();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].0, site);
    }

    #[test]
    fn recursive_spawns_terminate() {
        let mut fx = Fixture::new();
        let main = fx.func("main", FunctionRole::Entry, "");
        let s = fx.func("s", FunctionRole::Declared, "");
        let t = fx.func("t", FunctionRole::Declared, "");
        fx.call(main, s, CallKind::Direct);
        fx.call(s, t, CallKind::Spawn);
        fx.call(t, s, CallKind::Direct);
        fx.call(s, s, CallKind::Spawn);
        fx.call(t, t, CallKind::Spawn);

        let (diags, stats) = fx.run();
        assert!(diags.is_empty());
        assert!(stats.visits < 100, "visits: {}", stats.visits);
    }

    #[test]
    fn every_root_starts_its_own_walk() {
        let mut fx = Fixture::new();
        let main = fx.func("main", FunctionRole::Entry, "");
        let init = fx.func("init", FunctionRole::Initializer, "boot");
        let ui = fx.func("ui", FunctionRole::Declared, "main");
        fx.call(main, ui, CallKind::Direct);
        let site = fx.call(init, ui, CallKind::Direct);

        let (diags, stats) = fx.run();
        assert_eq!(
            diags,
            vec![(site, "function ui called from wrong context; boot does not match [main]".to_string())]
        );
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.seeded, 0);
    }

    #[test]
    fn first_spawn_edge_seeds_context() {
        let mut fx = Fixture::new();
        let a = fx.func("a", FunctionRole::Declared, "");
        let b = fx.func("b", FunctionRole::Declared, "");
        let target = fx.func("target", FunctionRole::Declared, "");
        let only_target = fx.func("only_target", FunctionRole::Declared, "target");
        let first = fx.call(a, target, CallKind::Spawn);
        fx.call(b, target, CallKind::Spawn);
        fx.call(target, only_target, CallKind::Direct);

        let (diags, stats) = fx.run();
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        assert_eq!(stats.roots, 0);
        assert_eq!(stats.seeded, 1);
        assert_eq!(first, 1);
    }
}
