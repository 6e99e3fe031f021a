use concur_graph::GraphError;
use thiserror::Error;

/// Result type for checker operations
pub type Result<T> = std::result::Result<T, CheckerError>;

/// Errors that can occur before or around a check run.
/// Rule violations are never errors; they are reported as diagnostics.
#[derive(Error, Debug)]
pub enum CheckerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Call graph could not be loaded or built
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CheckerError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
