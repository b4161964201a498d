//! Error types for Solid authentication and delegated Pod operations

use std::fmt;

/// Result type for Solid operations
pub type Result<T> = std::result::Result<T, SolidError>;

/// Step of the account-API handshake, used to label upstream failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Fetching the account API root for the password-login link
    DiscoverLogin,
    /// Posting email and password to obtain an account token
    PasswordLogin,
    /// Re-fetching the account API root for the client-credentials link
    DiscoverCredentials,
    /// Requesting a client id/secret pair for the WebID
    IssueClientCredentials,
    /// Exchanging the client credentials for a DPoP-bound access token
    RequestAccessToken,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeStep::DiscoverLogin => "account API discovery",
            HandshakeStep::PasswordLogin => "password login",
            HandshakeStep::DiscoverCredentials => "client credentials discovery",
            HandshakeStep::IssueClientCredentials => "client credentials issuance",
            HandshakeStep::RequestAccessToken => "access token request",
        };
        f.write_str(name)
    }
}

/// Solid-specific errors
#[derive(Debug, thiserror::Error)]
pub enum SolidError {
    /// Required identity inputs are absent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A handshake step failed or answered with an unexpected shape
    #[error("Upstream error during {step}: {message}")]
    Upstream {
        /// Step that failed
        step: HandshakeStep,
        /// Message of the underlying failure, unchanged
        message: String,
    },

    /// The call is missing a required value (e.g. the session id)
    #[error("{0}")]
    BadRequest(String),

    /// The session id does not resolve to a live session
    #[error("{0}")]
    Unauthorized(String),

    /// The remote storage answered a delegated call with a failure status
    #[error("{message}")]
    Delegated {
        /// HTTP status returned by the Pod
        status: u16,
        /// Description of the failed call
        message: String,
    },

    /// A delegated call failed before any status was received
    #[error("HTTP error: {0}")]
    Http(String),

    /// DPoP key generation or signing failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SolidError {
    /// Build an upstream error for a handshake step
    pub fn upstream(step: HandshakeStep, message: impl Into<String>) -> Self {
        SolidError::Upstream {
            step,
            message: message.into(),
        }
    }

    /// Whether the error concerns the local session rather than the remote call
    pub fn is_session_error(&self) -> bool {
        matches!(self, SolidError::BadRequest(_) | SolidError::Unauthorized(_))
    }

    /// Get HTTP-style status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SolidError::Configuration(_) => 500,
            SolidError::Upstream { .. } => 502,
            SolidError::BadRequest(_) => 400,
            SolidError::Unauthorized(_) => 401,
            SolidError::Delegated { status, .. } => *status,
            SolidError::Http(_) => 502,
            SolidError::Crypto(_) => 500,
            SolidError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for SolidError {
    fn from(err: serde_json::Error) -> Self {
        SolidError::Internal(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for SolidError {
    fn from(err: reqwest::Error) -> Self {
        SolidError::Http(err.to_string())
    }
}
