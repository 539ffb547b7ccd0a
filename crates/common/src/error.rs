//! Common error types and handling for Enlist

use serde::Serialize;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-checkable reason attached to every `Error::Conflict`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// Team already holds `max_size` members
    TeamFull,
    /// Responder is already on the team
    AlreadyMember,
    /// Invitation or payment was already resolved
    AlreadyProcessed,
    /// A pending invitation for the same (team, email) exists
    DuplicateInvitation,
    /// Team registration carries a payment; membership is frozen
    PaymentLocked,
    /// Record already exists
    AlreadyExists,
    /// State machine rejected the transition
    InvalidTransition,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::TeamFull => "TeamFull",
            ConflictKind::AlreadyMember => "AlreadyMember",
            ConflictKind::AlreadyProcessed => "AlreadyProcessed",
            ConflictKind::DuplicateInvitation => "DuplicateInvitation",
            ConflictKind::PaymentLocked => "PaymentLocked",
            ConflictKind::AlreadyExists => "AlreadyExists",
            ConflictKind::InvalidTransition => "InvalidTransition",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common error type for the Enlist workspace
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict ({0}): {1}")]
    Conflict(ConflictKind, String),

    /// Transaction aborted by a concurrent writer; the whole operation may be retried
    #[error("Transient store error: {0}")]
    Transient(String),

    /// The store could not tell whether the commit landed; re-query before retrying
    #[error("Commit outcome unknown: {0}")]
    Ambiguous(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a conflict with a machine-checkable kind
    pub fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        Error::Conflict(kind, message.into())
    }

    /// Get the error code for structured responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Unexpected(_) => "UNEXPECTED_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Authorization(_) => "AUTHORIZATION_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_, _) => "CONFLICT",
            Error::Transient(_) => "TRANSIENT_STORE_ERROR",
            Error::Ambiguous(_) => "COMMIT_OUTCOME_UNKNOWN",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Conflict reason, if this is a conflict
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            Error::Conflict(kind, _) => Some(*kind),
            _ => None,
        }
    }

    /// Only aborted transactions are safe to resubmit unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Log server-side faults; caller mistakes are left to the caller
    pub fn log(&self) {
        match self {
            Error::Unexpected(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::Internal(_)
            | Error::Ambiguous(_) => {
                tracing::error!(error = %self, code = self.error_code(), "Internal error");
            }
            Error::Transient(_) => {
                tracing::warn!(error = %self, "Transaction aborted by concurrent writer");
            }
            _ => {
                tracing::debug!(error = %self, code = self.error_code(), "Request rejected");
            }
        }
    }
}

/// Structured failure payload: a machine-checkable kind plus a human message
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConflictKind>,
    pub message: String,
    pub retryable: bool,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            code: err.error_code(),
            reason: err.conflict_kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
