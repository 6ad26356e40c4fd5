use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromoError {
    #[error("Model not fitted")]
    NotFitted,

    #[error("Feature mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Invalid transition: cannot {action} a model in status '{from}'")]
    InvalidTransition { from: String, action: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported artifact format version {found}")]
    UnsupportedArtifact { found: u32 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PromoError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type PromoResult<T> = Result<T, PromoError>;
