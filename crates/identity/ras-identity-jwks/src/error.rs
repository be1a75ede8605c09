//! JWKS and verification error types.

use thiserror::Error;

pub type JwksResult<T> = Result<T, JwksError>;

#[derive(Debug, Clone, Error)]
pub enum JwksError {
    #[error("Token is empty")]
    EmptyToken,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token header has no 'kid'")]
    MissingKid,

    #[error("No signing key found for kid '{0}'")]
    KeyNotFound(String),

    #[error("Invalid signing key material: {0}")]
    InvalidKey(String),

    #[error("Failed to fetch key set: {0}")]
    FetchFailed(String),

    #[error("Key set request timed out")]
    Timeout,

    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token validation failed: {0}")]
    Validation(String),
}

impl From<jsonwebtoken::errors::Error> for JwksError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwksError::Expired,
            ErrorKind::InvalidSignature => JwksError::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => JwksError::Malformed(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                JwksError::InvalidKey(err.to_string())
            }
            _ => JwksError::Validation(err.to_string()),
        }
    }
}
