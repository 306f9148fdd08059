use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("artifact {path}: {reason}")]
    Artifact { path: String, reason: String },

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("invalid mission: {0}")]
    InvalidMission(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("reasoning service error: {0}")]
    Reasoning(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
