//! Error types for gitcache
//!
//! All modules use `GitCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gitcache operations
pub type GitCacheResult<T> = Result<T, GitCacheError>;

/// All errors that can occur in gitcache
#[derive(Error, Debug)]
pub enum GitCacheError {
    // Broker errors
    #[error("Sticky disk broker unreachable at {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("Sticky disk broker returned {status}: {message}")]
    Broker { status: u16, message: String },

    #[error("Invalid broker response: {0}")]
    Device(String),

    // Mirror errors
    #[error("git {op} failed: {detail}")]
    Mirror { op: String, detail: String },

    #[error("git {op} exceeded {secs}s deadline")]
    MirrorTimeout { op: String, secs: u64 },

    // Filesystem errors (release path; logged and swallowed by callers)
    #[error("Filesystem operation failed: {context}: {detail}")]
    Filesystem { context: String, detail: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Missing required configuration: {0}")]
    ConfigMissing(&'static str),

    // Lease state errors
    #[error("No lease state found for {0}")]
    LeaseNotFound(String),

    #[error("Workspace has no .git directory: {0}")]
    WorkspaceInvalid(PathBuf),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed to start: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GitCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a mirror operation error
    pub fn mirror(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Mirror {
            op: op.into(),
            detail: detail.into(),
        }
    }

    /// Create a filesystem error
    pub fn filesystem(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Filesystem {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error should be retried by the bounded retry policy.
    ///
    /// Only network-facing git failures qualify. Broker connectivity is
    /// deliberately not retryable: an unreachable broker fails the cached
    /// path immediately and the job falls back to a plain checkout.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Mirror { .. } | Self::CommandFailed { .. })
    }

    /// Whether this error ends the cached-checkout attempt without failing
    /// the job (the caller prints a fallback notice instead).
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Broker { .. } | Self::Device(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GitCacheError::Connection {
            url: "http://192.168.127.1:5556".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("broker unreachable"));
    }

    #[test]
    fn error_retryable() {
        assert!(GitCacheError::mirror("fetch", "early EOF").is_retryable());
        assert!(!GitCacheError::Device("missing exposeId".to_string()).is_retryable());
    }

    #[test]
    fn error_fallback() {
        assert!(GitCacheError::Device("missing deviceName".to_string()).is_fallback());
        assert!(!GitCacheError::mirror("clone", "exit 128").is_fallback());
    }

    #[test]
    fn timeout_display_names_deadline() {
        let err = GitCacheError::MirrorTimeout {
            op: "gc".to_string(),
            secs: 300,
        };
        assert!(err.to_string().contains("300s"));
    }
}
