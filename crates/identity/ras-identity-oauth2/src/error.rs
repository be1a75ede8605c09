//! OAuth2 error types.

use crate::types::FlagType;
use ras_identity_jwks::JwksError;
use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    /// Missing or contradictory construction input
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// An authenticated call was made before any token was obtained
    #[error("Login required")]
    LoginRequired,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token kind '{0}', expected 'access_token' or 'id_token'")]
    InvalidTokenKind(String),

    #[error("No {0} present in the token set")]
    MissingToken(&'static str),

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Token request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Token request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Invalid state parameter")]
    StateMismatch,

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Token verification failed: {0}")]
    Verification(#[from] JwksError),
}

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("Flag '{code}' not found and no default value was given")]
    FlagNotFound { code: String },

    #[error("Flag '{code}' is of type {stored}, requested {requested}")]
    FlagTypeMismatch {
        code: String,
        stored: FlagType,
        requested: FlagType,
    },

    #[error("Flag '{code}' is present but cannot be decoded: {reason}")]
    MalformedFlag { code: String, reason: String },

    #[error("Flag '{code}' value cannot be read as {expected}")]
    InvalidFlagValue { code: String, expected: FlagType },
}

impl TokenError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TokenError::Timeout
        } else {
            TokenError::Http(err)
        }
    }
}

impl From<JwksError> for OAuth2Error {
    fn from(err: JwksError) -> Self {
        OAuth2Error::Token(TokenError::Verification(err))
    }
}
