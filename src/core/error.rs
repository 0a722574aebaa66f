use crate::core::models::ResourceKind;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error at {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("rate limited at {endpoint}: status {status} after {attempts} attempts")]
    RateLimited {
        endpoint: String,
        status: u16,
        attempts: u32,
    },

    #[error("authentication error{}: {message}", .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Auth {
        code: Option<String>,
        message: String,
    },

    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("validation error for {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("cache error for {kind}: {source}")]
    Cache {
        kind: ResourceKind,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to join saving session {event_id}: {source}")]
    Join {
        event_id: i64,
        #[source]
        source: Box<Error>,
    },

    #[error("state persistence failed for {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn auth(code: Option<&str>, message: impl Into<String>) -> Self {
        Error::Auth {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::RateLimited { .. } => true,
            Error::Cache { source, .. } | Error::Join { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth { .. } => true,
            Error::Cache { source, .. } | Error::Join { source, .. } => source.is_auth(),
            _ => false,
        }
    }
}

/// Statuses the transport retries with backoff.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub fn is_auth_failure_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should be retryable");
        }
        for status in [200, 400, 401, 403, 404] {
            assert!(!is_retryable_status(status), "{status} should not be retryable");
        }
    }

    #[test]
    fn test_auth_failure_statuses() {
        assert!(is_auth_failure_status(401));
        assert!(is_auth_failure_status(403));
        assert!(!is_auth_failure_status(200));
        assert!(!is_auth_failure_status(429));
    }

    #[test]
    fn test_auth_error_display() {
        let with_code = Error::auth(Some("KT-CT-1139"), "JWT has expired");
        assert_eq!(
            with_code.to_string(),
            "authentication error [KT-CT-1139]: JWT has expired"
        );

        let without_code = Error::auth(None, "empty token received");
        assert_eq!(
            without_code.to_string(),
            "authentication error: empty token received"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = Error::validation("monitor.min_points", "must not be negative, got -5");
        assert_eq!(
            err.to_string(),
            "validation error for monitor.min_points: must not be negative, got -5"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cache_error_wraps_source() {
        let err = Error::Cache {
            kind: ResourceKind::SavingSessions,
            source: Box::new(Error::RateLimited {
                endpoint: "/accounts/A-1/".to_string(),
                status: 503,
                attempts: 4,
            }),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("cache error for saving_sessions"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_join_error_classification() {
        let err = Error::Join {
            event_id: 42,
            source: Box::new(Error::Status {
                endpoint: "/accounts/A-1/saving-sessions/42/join".to_string(),
                status: 400,
            }),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_auth());
        assert!(err.to_string().contains("42"));
    }
}
