//! One check run over a whole program.

use crate::annotations::{AnnotationStore, Annotations, TagMarker, Tags};
use crate::config::CheckerConfig;
use crate::engine::ContextPropagationEngine;
use crate::error::Result;
use crate::lexical::LexicalScopeChecker;
use crate::sink::{CheckerKind, Diagnostic, DiagnosticSink};
use concur_graph::{EntityKey, Program};
use serde::{Deserialize, Serialize};

/// Exported tags of one declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub key: EntityKey,
    pub name: String,
    pub tags: Tags,
}

/// Result of a check run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Violations ordered by position
    pub diagnostics: Vec<Diagnostic>,

    /// `//concur:` facts, ordered by key
    pub context_facts: Vec<Fact>,

    /// `//tag:` facts, ordered by key
    pub lexical_facts: Vec<Fact>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn count(&self, checker: CheckerKind) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.checker == checker)
            .count()
    }
}

pub struct Analysis {
    config: CheckerConfig,
}

impl Analysis {
    pub fn new(config: CheckerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Run the enabled checkers over `program`
    pub fn run(&self, program: &Program) -> Report {
        // Phase 1: every fact is recorded before any is read
        let context = self.collect(program, &self.config.concur_marker());
        let lexical_marker = self.config.tag_marker();
        let lexical = self.collect(program, &lexical_marker);

        // Phase 2: checks
        let mut sink = DiagnosticSink::new();

        if self.config.runs(CheckerKind::Context) {
            if program.graph.has_program_functions() {
                let engine = ContextPropagationEngine::new(
                    &program.graph,
                    &context,
                    &self.config.entry_context,
                );
                engine.run(&mut sink);
            } else {
                log::warn!("No call graph available; skipping context check");
            }
        }

        if self.config.runs(CheckerKind::Lexical) {
            let checker = LexicalScopeChecker::new(&lexical, &lexical_marker);
            let calls: usize = program
                .units
                .iter()
                .map(|unit| checker.check_unit(unit, &mut sink))
                .sum();
            log::info!(
                "Lexical check: {} files, {} calls",
                program.units.len(),
                calls
            );
        }

        Report {
            diagnostics: sink.into_vec(),
            context_facts: self.facts(program, &context),
            lexical_facts: self.facts(program, &lexical),
        }
    }

    fn collect(&self, program: &Program, marker: &TagMarker) -> Annotations {
        let mut store = AnnotationStore::new();
        store.scan(marker, program.graph.functions().map(|(_, f)| f));
        store.seal()
    }

    fn facts(&self, program: &Program, annotations: &Annotations) -> Vec<Fact> {
        annotations
            .iter()
            .map(|(key, tags)| Fact {
                key: key.clone(),
                name: program
                    .graph
                    .find(key)
                    .map(|idx| program.graph.function(idx).name.clone())
                    .unwrap_or_default(),
                tags: tags.clone(),
            })
            .collect()
    }
}
