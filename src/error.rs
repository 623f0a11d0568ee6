//! Error types for pose storage, migrations and configuration

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoseError>;

#[derive(Error, Debug)]
pub enum PoseError {
    #[error("Pose '{name}' already exists in {table}")]
    DuplicateName { table: &'static str, name: String },

    #[error("Pose '{name}' not found in {table}")]
    NotFound { table: &'static str, name: String },

    #[error("Migration {unit} failed: {message}")]
    MigrationFatal { unit: String, message: String },

    #[error("Store error: {0}")]
    StoreIo(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PoseError {
    /// True for outcomes that refuse an operation without indicating a fault
    pub fn is_refusal(&self) -> bool {
        matches!(self, PoseError::DuplicateName { .. } | PoseError::NotFound { .. })
    }
}
