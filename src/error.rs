//! Error types for specforge

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Specforge errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Spec parse error: {0}")]
    SpecParse(String),

    #[error("Expression parse error: {0}")]
    ExprParse(String),

    #[error("Validation failed with {} error(s)", .0.len())]
    Validation(Vec<crate::validate::StructuralError>),

    #[error(transparent)]
    Compile(#[from] crate::compile::CompileError),

    #[error(transparent)]
    Emission(#[from] crate::render::EmissionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
