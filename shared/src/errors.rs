//! Error types for the Authgate service

use thiserror::Error;

/// Reason an authentication attempt was refused
///
/// Every variant is reported to clients as a plain 401. The variant itself
/// only travels through logs and metrics, so a forged signature and an
/// expired session stay distinguishable in the audit trail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthError {
    #[error("No account for email")]
    UnknownEmail,

    #[error("Password mismatch")]
    WrongPassword,

    #[error("Missing token")]
    MissingToken,

    #[error("Malformed authorization header")]
    MalformedHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Session expired or revoked")]
    SessionInvalid,

    #[error("Unknown refresh token")]
    RefreshNotFound,

    #[error("Refresh token expired")]
    RefreshExpired,

    #[error("No identity on request")]
    MissingIdentity,
}

impl AuthError {
    /// Stable machine-readable reason code (log field and metric label)
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UnknownEmail => "unknown_email",
            AuthError::WrongPassword => "wrong_password",
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::InvalidToken => "invalid_token",
            AuthError::SessionInvalid => "session_invalid",
            AuthError::RefreshNotFound => "refresh_not_found",
            AuthError::RefreshExpired => "refresh_expired",
            AuthError::MissingIdentity => "missing_identity",
        }
    }

    /// Message safe to hand to a client
    ///
    /// Credential failures share one message so the response does not reveal
    /// whether an email is registered.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::UnknownEmail | AuthError::WrongPassword => "invalid credentials",
            AuthError::MissingToken => "missing bearer token",
            AuthError::MalformedHeader => "invalid authorization header",
            AuthError::InvalidToken => "invalid token",
            AuthError::SessionInvalid => "invalid or expired session",
            AuthError::RefreshNotFound | AuthError::RefreshExpired => {
                "invalid or expired refresh token"
            }
            AuthError::MissingIdentity => "unauthorized",
        }
    }
}
