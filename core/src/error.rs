use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid config in '{section}': {reason}")]
    InvalidConfig { section: String, reason: String },

    #[error("Unknown stat '{stat}' referenced by {context}")]
    UnknownStat { context: String, stat: String },

    #[error("Subsystem '{name}' not found")]
    SubsystemNotFound { name: String },

    #[error("No snapshot saved for companion '{companion_id}'")]
    SnapshotMissing { companion_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn invalid(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            section: section.into(),
            reason:  reason.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
