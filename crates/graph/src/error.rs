use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Parse error in {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Duplicate function: {0}")]
    DuplicateFunction(String),

    #[error("Tree-sitter error: {0}")]
    TreeSitterError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid graph document: {0}")]
    DocumentError(#[from] serde_json::Error),
}

impl GraphError {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitterError(msg.into())
    }
}
