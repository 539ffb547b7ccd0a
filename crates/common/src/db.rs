//! Shared store error types for Enlist
//!
//! Every document store backend reports failures through `StoreError`;
//! domain code converts them into the caller-visible `Error`.

use crate::error::{ConflictKind, Error};
use thiserror::Error;
use uuid::Uuid;

/// Document store error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found")]
    NotFound,

    #[error("Document already exists")]
    AlreadyExists,

    /// A document read by the transaction changed before commit
    #[error("Transaction conflict on {collection}/{key}")]
    Conflict { collection: String, key: Uuid },

    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend lost the connection while committing
    #[error("Commit outcome unknown: {0}")]
    CommitOutcomeUnknown(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn conflict(collection: &str, key: Uuid) -> Self {
        StoreError::Conflict {
            collection: collection.to_string(),
            key,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Error::NotFound("Document not found".to_string()),
            StoreError::AlreadyExists => {
                Error::conflict(ConflictKind::AlreadyExists, "Document already exists")
            }
            e @ StoreError::Conflict { .. } => Error::Transient(e.to_string()),
            StoreError::Connection(e) => Error::Database(e),
            StoreError::Serialization(e) => Error::Serialization(e),
            StoreError::CommitOutcomeUnknown(msg) => Error::Ambiguous(msg),
            StoreError::InvalidData(msg) => Error::Internal(msg),
        }
    }
}
