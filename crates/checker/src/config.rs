use crate::annotations::TagMarker;
use crate::error::{CheckerError, Result};
use crate::sink::CheckerKind;
use concur_graph::BuildOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up in the project root
pub const CONFIG_FILE_NAME: &str = "concur.toml";

/// Configuration for a check run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Context of roots without a tag of their own
    pub entry_context: String,

    /// How Rust sources become a call graph
    #[serde(flatten)]
    pub build: BuildOptions,

    /// Comment prefix of context tags
    pub concur_marker: String,

    /// Comment prefix of lexical tags
    pub tag_marker: String,

    /// Checkers to run
    pub checkers: Vec<CheckerKind>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            entry_context: "main".to_string(),
            build: BuildOptions::default(),
            concur_marker: "//concur:".to_string(),
            tag_marker: "//tag:".to_string(),
            checkers: vec![CheckerKind::Context, CheckerKind::Lexical],
        }
    }
}

impl CheckerConfig {
    /// Only the call-graph context check
    pub fn context_only() -> Self {
        Self {
            checkers: vec![CheckerKind::Context],
            ..Default::default()
        }
    }

    /// Only the lexical nesting check
    pub fn lexical_only() -> Self {
        Self {
            checkers: vec![CheckerKind::Lexical],
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CheckerError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.concur_marker.trim().is_empty() {
            return Err(CheckerError::invalid_config("concur_marker must not be empty"));
        }

        if self.tag_marker.trim().is_empty() {
            return Err(CheckerError::invalid_config("tag_marker must not be empty"));
        }

        if self.concur_marker == self.tag_marker {
            return Err(CheckerError::invalid_config(format!(
                "concur_marker and tag_marker must differ (both are {:?})",
                self.concur_marker
            )));
        }

        if self.entry_context.trim().is_empty() {
            return Err(CheckerError::invalid_config("entry_context must not be empty"));
        }

        if self.checkers.is_empty() {
            return Err(CheckerError::invalid_config("at least one checker must be enabled"));
        }

        Ok(())
    }

    pub fn runs(&self, checker: CheckerKind) -> bool {
        self.checkers.contains(&checker)
    }

    pub fn build_options(&self) -> &BuildOptions {
        &self.build
    }

    pub fn concur_marker(&self) -> TagMarker {
        TagMarker::new(self.concur_marker.clone())
    }

    pub fn tag_marker(&self) -> TagMarker {
        TagMarker::new(self.tag_marker.clone())
    }
}
