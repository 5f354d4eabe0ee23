use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Bugbuster
#[derive(Error, Debug)]
pub enum BugbusterError {
    /// Key-based lookup found no matching defect record
    #[error("Defect not found: {key}")]
    NotFound { key: String },

    /// Generative model call failed or timed out
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Model output did not follow the requested structure
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    /// Embedding index has not been built yet
    #[error("Embedding index is not available yet")]
    IndexUnavailable,

    /// Text encoding or index errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BugbusterError {
    /// Text shown to the person asking when this error ends a request
    pub fn user_message(&self) -> String {
        match self {
            BugbusterError::NotFound { key } => format!(
                "**Defect not found**\n\n{} is not in the current defect database.",
                key
            ),
            BugbusterError::Generation(_) => {
                "The answer service is not responding right now. Please try again shortly."
                    .to_string()
            }
            BugbusterError::IndexUnavailable => {
                "The defect index is still being built. Please retry in a moment.".to_string()
            }
            _ => "Something went wrong while analysing your question. Please try again."
                .to_string(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Bugbuster operations
pub type Result<T> = std::result::Result<T, BugbusterError>;
