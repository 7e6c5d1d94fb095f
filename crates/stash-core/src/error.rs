use thiserror::Error;

/// Result type alias for Stash operations
pub type Result<T> = std::result::Result<T, StashError>;

#[derive(Error, Debug)]
pub enum StashError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Path traversal: {0}")]
    PathTraversal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl StashError {
    /// Check if the error should be audited as a security event
    ///
    /// NIST 800-53: AU-2 (Audit Events)
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            StashError::Authentication(_)
                | StashError::PermissionDenied(_)
                | StashError::PathTraversal(_)
        )
    }

    /// Message safe to send back to the client.
    ///
    /// Traversal attempts are reported as a generic error so the reply does
    /// not confirm to the peer that the path check exists; the full detail
    /// is logged server-side.
    pub fn client_message(&self) -> String {
        match self {
            StashError::PathTraversal(_) => "Invalid path".to_string(),
            StashError::Config(_) => "Server configuration error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_security_event() {
        assert!(StashError::Authentication("bad password".into()).is_security_event());
        assert!(StashError::PermissionDenied("upload".into()).is_security_event());
        assert!(StashError::PathTraversal("../etc".into()).is_security_event());
        assert!(!StashError::NotFound("a.txt".into()).is_security_event());
        assert!(!StashError::Protocol("bad line".into()).is_security_event());
    }

    #[test]
    fn test_client_message_hides_traversal_detail() {
        let err = StashError::PathTraversal("../../etc/shadow".into());
        assert_eq!(err.client_message(), "Invalid path");
        assert!(!err.client_message().contains("shadow"));

        let err = StashError::NotFound("report.txt".into());
        assert!(err.client_message().contains("report.txt"));
    }
}
