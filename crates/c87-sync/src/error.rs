//! Error types for the sync core

use crate::mutation::MutationKind;
use c87_api_client::{ApiError, TokenAmount};
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sync core error types
///
/// The first five variants are resolved locally before any speculative
/// effect is applied. The remote variants are returned only after rollback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// No identity token in the session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A confirmed mutation already exists for this key
    #[error("{kind} already done for {}", target_label(.target))]
    AlreadyDone {
        kind: MutationKind,
        target: Option<u64>,
    },

    /// A mutation for this key is still in flight
    #[error("{kind} already pending for {}", target_label(.target))]
    AlreadyPending {
        kind: MutationKind,
        target: Option<u64>,
    },

    /// Request rejected before reaching the server
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Spend would take the balance below zero
    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },

    /// Server returned a non-success status
    #[error("Rejected by server: {}", .reason.as_deref().unwrap_or("no reason given"))]
    RemoteRejected {
        status: Option<u16>,
        reason: Option<String>,
    },

    /// Transport-level failure
    #[error("Server unreachable: {0}")]
    RemoteUnreachable(String),

    /// Unexpected payload shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the error was decided locally, before touching any state
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::NotAuthenticated
                | SyncError::AlreadyDone { .. }
                | SyncError::AlreadyPending { .. }
                | SyncError::InvalidRequest(_)
                | SyncError::InsufficientBalance { .. }
        )
    }

    /// Reason suitable for a user-facing toast
    pub fn user_reason(&self) -> String {
        match self {
            SyncError::RemoteRejected {
                reason: Some(reason),
                ..
            } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Mutations fail closed: a malformed confirmation counts as a rejection
    pub(crate) fn for_mutation(self) -> Self {
        match self {
            SyncError::MalformedResponse(detail) => SyncError::RemoteRejected {
                status: None,
                reason: Some(format!("unexpected response: {}", detail)),
            },
            other => other,
        }
    }
}

fn target_label(target: &Option<u64>) -> String {
    match target {
        Some(id) => format!("item {}", id),
        None => "account".to_string(),
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(e) => SyncError::RemoteUnreachable(e.to_string()),
            ApiError::Rejected { status, reason } => SyncError::RemoteRejected {
                status: Some(status),
                reason,
            },
            ApiError::Malformed(detail) => SyncError::MalformedResponse(detail),
            ApiError::InvalidConfig(detail) => SyncError::Config(detail),
        }
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}
