use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] BridgeError),

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid operation ID: {0}")]
    InvalidOperationId(String),

    #[error("Invalid value: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Resolution rejected for conflict {conflict_id}: {reason}")]
    ResolutionRejected { conflict_id: String, reason: String },

    #[error("Operation {operation_id} failed after {attempts} attempts: {message}")]
    OperationFailed {
        operation_id: String,
        attempts: u32,
        message: String,
    },

    #[error("Conflict {0} not found")]
    ConflictNotFound(String),

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },
}

impl SyncError {
    /// Whether the collaborator refused the call for authorization reasons
    pub fn is_access_denied(&self) -> bool {
        matches!(self, SyncError::Collaborator(e) if e.is_access_denied())
    }

    /// Whether repeating the call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Collaborator(e) => e.is_transient(),
            SyncError::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
