use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiddError {
    #[error("workflow not found at {0}: expected an aidd/ directory with docs/ (set AIDD_ROOT to override)")]
    WorkflowNotFound(String),

    #[error("ticket not provided and docs/.active_ticket is missing: run 'aidd activate-feature <ticket>'")]
    TicketMissing,

    #[error("invalid stage '{0}': use --allow-custom to set a non-standard stage")]
    InvalidStage(String),

    #[error("invalid config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("git failed: {0}")]
    Git(String),

    #[error("git timed out after {0}ms")]
    GitTimeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AiddError>;
