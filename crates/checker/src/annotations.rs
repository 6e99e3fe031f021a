//! Declared tags, extracted once from comment lines and looked up many times.
//!
//! Facts are written into an [`AnnotationStore`] during the scan phase and become
//! readable only after [`AnnotationStore::seal`], so every lookup sees the complete
//! table regardless of which file declared the entity.

use concur_graph::{EntityKey, Function};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

/// Ordered tag list. Order matters: the first tag names a spawned context, and a
/// negative tag (`!name`) overrides earlier positive matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

static NO_TAGS: Tags = Tags(Vec::new());

impl Tags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(Into::into).collect())
    }

    pub fn empty() -> &'static Tags {
        &NO_TAGS
    }

    /// Whether every tag in `want` also appears in `self`
    pub fn contains_all(&self, want: &Tags) -> bool {
        want.iter().all(|tag| self.0.contains(tag))
    }
}

impl Deref for Tags {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Tags {
    /// `[a b c]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(" "))
    }
}

/// Comment prefix introducing a tag line, e.g. `//concur:`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMarker {
    prefix: String,
}

impl TagMarker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Collect tags from every line starting with the marker, in order.
    /// `//concur:a,b` yields `a`, `b`; a bare `//concur:` yields nothing.
    pub fn extract<'a, I>(&self, lines: I) -> Tags
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tags = Vec::new();
        for line in lines {
            let Some(rest) = line.trim().strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            tags.extend(
                rest.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string),
            );
        }
        Tags(tags)
    }
}

/// Write phase of the fact table
#[derive(Debug, Default)]
pub struct AnnotationStore {
    facts: BTreeMap<EntityKey, Tags>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record tags for an entity. Empty tag lists are not recorded; the first record wins.
    pub fn record(&mut self, key: EntityKey, tags: Tags) {
        if tags.is_empty() {
            return;
        }
        self.facts.entry(key).or_insert(tags);
    }

    /// Extract and record the tags of every program function
    pub fn scan<'a, I>(&mut self, marker: &TagMarker, functions: I)
    where
        I: IntoIterator<Item = &'a Function>,
    {
        for function in functions {
            if function.is_external() {
                continue;
            }
            let tags = marker.extract(function.doc.iter().map(String::as_str));
            self.record(function.key.clone(), tags);
        }
    }

    /// End the write phase
    pub fn seal(self) -> Annotations {
        log::debug!("Sealed {} annotated functions", self.facts.len());
        Annotations { facts: self.facts }
    }
}

/// Read-only fact table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    facts: BTreeMap<EntityKey, Tags>,
}

impl Annotations {
    /// Tags declared for `key`; empty when none were declared
    pub fn lookup(&self, key: &EntityKey) -> &Tags {
        self.facts.get(key).unwrap_or(Tags::empty())
    }

    /// All facts ordered by entity key
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &Tags)> {
        self.facts.iter()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concur_graph::FunctionRole;
    use pretty_assertions::assert_eq;

    fn concur() -> TagMarker {
        TagMarker::new("//concur:")
    }

    #[test]
    fn extract_splits_and_keeps_order() {
        let tags = concur().extract([
            "/// Worker loop",
            "//concur:bar,main",
            "// unrelated",
            "//concur:!ui",
        ]);
        assert_eq!(tags, Tags::new(["bar", "main", "!ui"]));
    }

    #[test]
    fn extract_drops_empty_remainders() {
        let tags = concur().extract(["//concur:", "//concur:a,,b", "//tag:x"]);
        assert_eq!(tags, Tags::new(["a", "b"]));
    }

    #[test]
    fn markers_are_independent() {
        let lines = ["//concur:main", "//tag:db"];
        assert_eq!(concur().extract(lines), Tags::new(["main"]));
        assert_eq!(TagMarker::new("//tag:").extract(lines), Tags::new(["db"]));
    }

    #[test]
    fn empty_record_is_absent_record() {
        let mut store = AnnotationStore::new();
        store.record(EntityKey::new("m::a"), Tags::default());
        store.record(EntityKey::new("m::b"), Tags::new(["x"]));
        store.record(EntityKey::new("m::b"), Tags::new(["y"]));
        let sealed = store.seal();

        assert_eq!(sealed.len(), 1);
        assert!(sealed.lookup(&EntityKey::new("m::a")).is_empty());
        assert!(sealed.lookup(&EntityKey::new("m::missing")).is_empty());
        assert_eq!(sealed.lookup(&EntityKey::new("m::b")), &Tags::new(["x"]));
    }

    #[test]
    fn scan_skips_external_functions() {
        let functions = vec![
            Function::program("m::a", "a", FunctionRole::Declared).with_doc(["//concur:main"]),
            Function::external("extern::b", "b").with_doc(["//concur:main"]),
        ];
        let mut store = AnnotationStore::new();
        store.scan(&concur(), &functions);
        let sealed = store.seal();
        let keys: Vec<&str> = sealed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["m::a"]);
    }

    #[test]
    fn tags_render_like_lists() {
        assert_eq!(Tags::new(["foo", "bar"]).to_string(), "[foo bar]");
        assert_eq!(Tags::default().to_string(), "[]");
    }
}
