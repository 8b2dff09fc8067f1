use thiserror::Error;

use crate::types::{EntityKind, NaturalKey};

#[derive(Error, Debug)]
pub enum TimetableError {
    #[error("Row source contains no rows")]
    EmptySource,

    #[error("Location column '{0}' not found in header set")]
    MissingLocationColumn(String),

    #[error("No {kind} registered for key {key}")]
    Unresolved { kind: EntityKind, key: NaturalKey },

    #[error("No {kind} with synthetic id {id}")]
    UnknownId { kind: EntityKind, id: u32 },

    #[error("Link to {0} serialized before resolution")]
    PendingLink(NaturalKey),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid row source: {0}")]
    Source(String),

    #[error("Store error: {message}")]
    Store { message: String },
}

pub type Result<T> = std::result::Result<T, TimetableError>;
