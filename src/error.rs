//! Error taxonomy for the fetch pipeline.

use thiserror::Error;

/// Errors surfaced to callers.
///
/// Rate limiting is not in this taxonomy by default: it is absorbed by the
/// cooldown loop inside the clients. [`InstagramError::RateLimited`] only
/// appears when a caller opts into a cooldown-cycle ceiling via
/// [`Pacing::max_cooldown_cycles`](crate::Pacing).
#[derive(Error, Debug)]
pub enum InstagramError {
    /// HTTP transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing or unusable credential, or token exchange failure
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Invalid caller input (malformed date parameter, unknown scope)
    #[error("validation error: {0}")]
    Validation(String),

    /// Remote reported a bad request, carries the server message
    #[error("request rejected: {0}")]
    Request(String),

    /// Resource absent
    #[error("resource not found")]
    NotFound,

    /// Response did not match the expected schema
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Cooldown-cycle ceiling reached while rate limited
    #[error("still rate limited after {cycles} cooldown cycles")]
    RateLimited { cycles: u32 },
}

impl InstagramError {
    /// Whether the failure came from the remote rather than caller input.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Request(_) | Self::NotFound | Self::Protocol(_)
        )
    }
}

/// Result type for all fetch operations.
pub type Result<T> = std::result::Result<T, InstagramError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_and_caller_failures_are_distinguished() {
        assert!(InstagramError::NotFound.is_remote());
        assert!(InstagramError::Request("bad".into()).is_remote());
        assert!(!InstagramError::Validation("bad date".into()).is_remote());
        assert!(!InstagramError::Authentication("no token".into()).is_remote());
    }

    #[test]
    fn messages_carry_context() {
        let err = InstagramError::Request("The access_token provided is invalid.".into());
        assert_eq!(
            err.to_string(),
            "request rejected: The access_token provided is invalid."
        );
        let err = InstagramError::RateLimited { cycles: 3 };
        assert_eq!(err.to_string(), "still rate limited after 3 cooldown cycles");
    }
}
