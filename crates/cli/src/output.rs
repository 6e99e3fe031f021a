use anyhow::Result;
use clap::ValueEnum;
use concur_checker::{Fact, Report};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `file:line:col: [checker] message`, one per line
    Text,
    Json,
}

pub fn render_diagnostics(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for diagnostic in &report.diagnostics {
                writeln!(out, "{diagnostic}")?;
            }
            Ok(out)
        }
        OutputFormat::Json => json(&report.diagnostics),
    }
}

#[derive(Serialize)]
struct FactsOutput<'a> {
    context: &'a [Fact],
    lexical: &'a [Fact],
}

pub fn render_facts(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for (title, facts) in [
                ("context", &report.context_facts),
                ("lexical", &report.lexical_facts),
            ] {
                writeln!(out, "{title}:")?;
                for fact in facts {
                    writeln!(out, "  {}: {}", fact.name, fact.tags)?;
                }
            }
            Ok(out)
        }
        OutputFormat::Json => json(&FactsOutput {
            context: &report.context_facts,
            lexical: &report.lexical_facts,
        }),
    }
}

fn json(value: &impl Serialize) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concur_checker::{CheckerKind, Diagnostic, Tags};
    use concur_graph::{EntityKey, Position};

    fn report() -> Report {
        Report {
            diagnostics: vec![Diagnostic {
                position: Position::new("src/main.rs", 4, 8),
                message: "function foo called from wrong context; bar does not match [main]".into(),
                checker: CheckerKind::Context,
            }],
            context_facts: vec![Fact {
                key: EntityKey::new("src/main.rs::foo"),
                name: "foo".into(),
                tags: Tags::new(["main"]),
            }],
            lexical_facts: vec![],
        }
    }

    #[test]
    fn text_diagnostics_are_one_per_line() {
        let text = render_diagnostics(&report(), OutputFormat::Text).unwrap();
        assert_eq!(
            text,
            "src/main.rs:4:8: [context] function foo called from wrong context; bar does not match [main]\n"
        );
    }

    #[test]
    fn json_diagnostics_are_an_array() {
        let text = render_diagnostics(&report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["checker"], "context");
        assert_eq!(value[0]["position"]["line"], 4);
    }

    #[test]
    fn facts_are_grouped_by_namespace() {
        let text = render_facts(&report(), OutputFormat::Text).unwrap();
        assert_eq!(text, "context:\n  foo: [main]\nlexical:\n");

        let json: serde_json::Value =
            serde_json::from_str(&render_facts(&report(), OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["context"][0]["tags"][0], "main");
        assert_eq!(json["lexical"].as_array().unwrap().len(), 0);
    }
}
