// src/infra/errors.rs — Error types for funcchat-eval

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    // Cache errors (fatal: a corrupt cache cannot be trusted for resume)
    #[error("Malformed cache entry in {} at line {line}: {source} (line: {content})", path.display())]
    MalformedCacheEntry {
        path: PathBuf,
        line: usize,
        content: String,
        #[source]
        source: serde_json::Error,
    },

    // Executor errors
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Executor call for request {serial_num} timed out after {after_ms}ms")]
    Timeout { serial_num: u64, after_ms: u64 },

    #[error("Batch aborted at request {serial_num}: {message}")]
    BatchAborted { serial_num: u64, message: String },

    // Report errors
    #[error("Request {serial_num} is missing field '{field}'")]
    MissingField { serial_num: u64, field: String },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EvalError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EvalError::Provider {
                retriable: true,
                ..
            } | EvalError::Timeout { .. }
        )
    }
}
