//! Discovery Errors

use thiserror::Error;

/// Failure of a single remote list or invoke call
///
/// Never escapes discovery: a failed region contributes no resources and
/// a failed probe marks its resource inaccessible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("credential rejected: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Map a non-success HTTP status to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthenticated(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            _ => Self::Api { status, message },
        }
    }

    /// Expected "no invoke rights" outcomes
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::NotFound(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Hard failures of a discovery call
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A writer panicked while holding a cache lock
    #[error("{0} cache is poisoned")]
    CachePoisoned(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Malformed configuration value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(RemoteError::from_status(401, "x"), RemoteError::Unauthenticated(_)));
        assert!(matches!(RemoteError::from_status(403, "x"), RemoteError::PermissionDenied(_)));
        assert!(matches!(RemoteError::from_status(404, "x"), RemoteError::NotFound(_)));
        assert_eq!(
            RemoteError::from_status(503, "unavailable"),
            RemoteError::Api {
                status: 503,
                message: "unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_denials() {
        assert!(RemoteError::PermissionDenied("no".into()).is_denial());
        assert!(RemoteError::NotFound("gone".into()).is_denial());
        assert!(!RemoteError::Unauthenticated("expired".into()).is_denial());
        assert!(!RemoteError::Timeout("slow".into()).is_denial());
    }
}
