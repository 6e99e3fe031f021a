//! # Concur Checker
//!
//! Static checks that functions only run in the concurrency contexts they declare.
//!
//! ## Features
//!
//! - **Context propagation** - `//concur:` tags checked along every call path, switching
//!   context at each spawn
//! - **Lexical scopes** - `//tag:` tags inherited through static nesting only
//! - **Ordered diagnostics** - sorted by position, duplicates suppressed
//!
//! ## Tag rules
//!
//! ```text
//! //concur:worker,main   runs in `worker` or `main`
//! //concur:!main         runs anywhere except `main`
//! (no tags)              runs anywhere
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use concur_checker::{Analysis, CheckerConfig};
//! use concur_graph::{BuildOptions, ProgramBuilder};
//!
//! let mut builder = ProgramBuilder::new(BuildOptions::default())?;
//! builder.add_source("src/main.rs", "fn main() {}")?;
//! let report = Analysis::new(CheckerConfig::default())?.run(&builder.build());
//! for diagnostic in &report.diagnostics {
//!     println!("{diagnostic}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod analysis;
mod annotations;
mod config;
mod engine;
mod error;
mod lexical;
mod rule;
mod sink;

pub use analysis::{Analysis, Fact, Report};
pub use annotations::{AnnotationStore, Annotations, TagMarker, Tags};
pub use config::{CheckerConfig, CONFIG_FILE_NAME};
pub use engine::{ContextPropagationEngine, EngineStats};
pub use error::{CheckerError, Result};
pub use lexical::LexicalScopeChecker;
pub use rule::{is_negative, match_rule, Verdict, NEGATION};
pub use sink::{CheckerKind, Diagnostic, DiagnosticSink};
