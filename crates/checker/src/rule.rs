use crate::annotations::Tags;

/// Prefix of a negative (forbidden context) tag
pub const NEGATION: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Decide whether a function declaring `tags` may run under `context`.
///
/// Positive tags form a whitelist: once any is present, the context must be one of them.
/// A negative tag naming the context denies immediately, overriding any earlier positive
/// match. Untagged functions and negative-only lists that do not name the context are
/// unconstrained.
pub fn match_rule(context: &str, tags: &Tags) -> Verdict {
    let mut restricted = false;
    let mut satisfied = false;

    for tag in tags.iter() {
        match tag.strip_prefix(NEGATION) {
            Some(forbidden) => {
                if forbidden == context {
                    restricted = true;
                    satisfied = false;
                    break;
                }
            }
            None => {
                restricted = true;
                if tag == context {
                    satisfied = true;
                }
            }
        }
    }

    if !restricted || satisfied {
        Verdict::Allow
    } else {
        Verdict::Deny
    }
}

/// Whether `tag` is written in negative form
pub fn is_negative(tag: &str) -> bool {
    tag.starts_with(NEGATION)
}
