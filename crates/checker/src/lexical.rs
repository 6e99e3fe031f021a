//! Tag inheritance along static nesting.
//!
//! A call is accepted when the scope that lexically contains it carries every tag the
//! callee declares. Declarations take their tags from the sealed `//tag:` facts; a
//! literal takes its tags from a comment on its first line or the line above, and never
//! inherits from the scope around it.

use crate::annotations::{Annotations, TagMarker, Tags};
use crate::sink::{CheckerKind, Diagnostic, DiagnosticSink};
use concur_graph::{Scope, ScopeCall, ScopeKind, SourceUnit};
use std::borrow::Cow;

pub struct LexicalScopeChecker<'a> {
    annotations: &'a Annotations,
    marker: &'a TagMarker,
}

impl<'a> LexicalScopeChecker<'a> {
    pub fn new(annotations: &'a Annotations, marker: &'a TagMarker) -> Self {
        Self {
            annotations,
            marker,
        }
    }

    /// Check every call in every scope of `unit`; returns the number of calls checked
    pub fn check_unit(&self, unit: &SourceUnit, sink: &mut DiagnosticSink) -> usize {
        let mut checked = 0;
        let mut stack: Vec<&Scope> = unit.scopes.iter().rev().collect();

        while let Some(scope) = stack.pop() {
            let have = self.scope_tags(unit, scope);
            for call in &scope.calls {
                checked += 1;
                self.check_call(&have, call, sink);
            }
            stack.extend(scope.children.iter().rev());
        }

        log::debug!("{}: {} calls checked lexically", unit.path, checked);
        checked
    }

    /// Tags a scope provides to the calls directly inside it
    pub fn scope_tags(&self, unit: &SourceUnit, scope: &Scope) -> Cow<'a, Tags> {
        match &scope.kind {
            ScopeKind::Declaration { key } => Cow::Borrowed(self.annotations.lookup(key)),
            ScopeKind::Literal => {
                let lines = unit
                    .comments_near(scope.start_line)
                    .flat_map(|group| group.lines.iter().map(String::as_str));
                Cow::Owned(self.marker.extract(lines))
            }
        }
    }

    fn check_call(&self, have: &Tags, call: &ScopeCall, sink: &mut DiagnosticSink) {
        let want = match &call.callee {
            Some(key) => self.annotations.lookup(key),
            None => Tags::empty(),
        };
        if have.contains_all(want) {
            return;
        }

        sink.insert(Diagnostic {
            position: call.position.clone(),
            message: format!("incorrect tags for call of {}: have {have}, want {want}", call.name),
            checker: CheckerKind::Lexical,
        });
    }
}
