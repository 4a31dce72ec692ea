use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Collaborator call timed out after {0} ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::Network(_)
                | BridgeError::Timeout(_)
                | BridgeError::OperationFailed(_)
                | BridgeError::Io(_)
        )
    }

    /// Whether the collaborator refused the call for authorization reasons.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, BridgeError::PermissionDenied(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(BridgeError::Network("reset".to_string()).is_transient());
        assert!(BridgeError::Timeout(30_000).is_transient());
        assert!(!BridgeError::NotFound("f1".to_string()).is_transient());
        assert!(!BridgeError::PermissionDenied("f1".to_string()).is_transient());
        assert!(BridgeError::PermissionDenied("f1".to_string()).is_access_denied());
    }
}
