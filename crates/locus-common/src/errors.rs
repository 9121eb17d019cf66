use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failure reported by a collaborator: the remote stores, the local cache,
/// or the OS push provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RemoteError {
    /// Timeouts and connectivity failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout(_) | RemoteError::Unavailable(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Serialization(e.to_string())
    }
}

/// Errors surfaced by the sync subsystem to its callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The user declined the OS notification prompt. `open_settings` is set
    /// when the decline happened earlier and the OS will not prompt again.
    #[error("notification permission denied")]
    PermissionDenied { open_settings: bool },

    /// The environment cannot produce a push token.
    #[error("push token unavailable: {0}")]
    TokenUnavailable(String),

    #[error("remote write failed: {0}")]
    RemoteWriteFailed(String),

    /// The write would break the notification cascade rule.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("session invalid: {0}")]
    SessionInvalid(String),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unauthorized(msg) => SyncError::SessionInvalid(msg),
            other => SyncError::RemoteWriteFailed(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocusError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("presence.write_timeout_ms".into());
        assert_eq!(
            err.to_string(),
            "config validation error: presence.write_timeout_ms"
        );
    }

    #[test]
    fn remote_error_display() {
        assert_eq!(RemoteError::Timeout(5000).to_string(), "timed out after 5000 ms");
        assert_eq!(
            RemoteError::Unauthorized("token expired".into()).to_string(),
            "unauthorized: token expired"
        );
    }

    #[test]
    fn remote_error_transience() {
        assert!(RemoteError::Timeout(10).is_transient());
        assert!(RemoteError::Unavailable("offline".into()).is_transient());
        assert!(!RemoteError::Unauthorized("nope".into()).is_transient());
        assert!(!RemoteError::Serialization("bad".into()).is_transient());
    }

    #[test]
    fn unauthorized_maps_to_session_invalid() {
        let err: SyncError = RemoteError::Unauthorized("expired".into()).into();
        assert_eq!(err, SyncError::SessionInvalid("expired".into()));
    }

    #[test]
    fn other_remote_errors_map_to_write_failed() {
        let err: SyncError = RemoteError::Timeout(3000).into();
        assert!(matches!(err, SyncError::RemoteWriteFailed(ref m) if m.contains("3000")));

        let err: SyncError = RemoteError::Unavailable("dns".into()).into();
        assert!(matches!(err, SyncError::RemoteWriteFailed(_)));
    }

    #[test]
    fn serde_json_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RemoteError = bad.into();
        assert!(matches!(err, RemoteError::Serialization(_)));
    }

    #[test]
    fn locus_error_from_variants() {
        let err: LocusError = ConfigError::ParseError("bad toml".into()).into();
        assert!(matches!(err, LocusError::Config(_)));
        assert!(err.to_string().contains("bad toml"));

        let err: LocusError = SyncError::PermissionDenied {
            open_settings: false,
        }
        .into();
        assert!(matches!(err, LocusError::Sync(_)));
        assert_eq!(err.to_string(), "notification permission denied");

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: LocusError = io_err.into();
        assert!(matches!(err, LocusError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
