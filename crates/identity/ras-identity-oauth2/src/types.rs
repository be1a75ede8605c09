//! OAuth2 protocol and claim types.

use crate::error::{OAuth2Error, OAuth2Result, TokenError};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Options for building an authorization URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthUrlOptions {
    /// Explicit `state`; one is generated when absent
    pub state: Option<String>,
    /// Extra query parameters; a key already set by the builder is overridden
    pub additional_params: BTreeMap<String, String>,
    /// Adds `start_page=registration`
    pub is_registration: bool,
    /// Adds `is_create_org=true`
    pub is_create_org: bool,
}

impl AuthUrlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_params.insert(key.into(), value.into());
        self
    }

    pub fn registration(mut self) -> Self {
        self.is_registration = true;
        self
    }

    pub fn create_org(mut self) -> Self {
        self.is_create_org = true;
        self
    }
}

/// A built authorization URL and the `state` it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationUrl {
    pub url: String,
    pub state: String,
}

/// Parameters the provider sends back to the callback URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl AuthorizationCallback {
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }

    /// Parse a full callback URL (`https://app/callback?code=..&state=..`) or
    /// just its query string.
    pub fn parse(input: &str) -> OAuth2Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(OAuth2Error::Configuration(
                "authorization response is empty".to_string(),
            ));
        }

        let query = if input.contains("://") {
            let url = Url::parse(input).map_err(|e| {
                OAuth2Error::Configuration(format!("invalid authorization response: {}", e))
            })?;
            url.query().unwrap_or_default().to_string()
        } else {
            input.trim_start_matches('?').to_string()
        };

        let mut callback = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => callback.code = value,
                "state" => callback.state = value,
                "error" => callback.error = value,
                "error_description" => callback.error_description = value,
                _ => {}
            }
        }
        Ok(callback)
    }
}

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

/// Tokens held by one session.
///
/// Replaced as a whole on every fetch or refresh, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    /// `expires_in` as reported by the provider, if it was
    pub expires_in: Option<u64>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at `issued_at`.
    ///
    /// Without `expires_in` the access token's own `exp` is used; a token with
    /// neither counts as already expired. An `expires_in` too large to
    /// represent also defers to `exp`, and otherwise never expires.
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let expires_at = match response.expires_in {
            Some(seconds) => i64::try_from(seconds)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
                .or_else(|| expiry_claim(&response.access_token))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            None => expiry_claim(&response.access_token).unwrap_or(issued_at),
        };

        Self {
            access_token: response.access_token,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
            expires_in: response.expires_in,
            issued_at,
            expires_at,
        }
    }

    /// Keep the previous refresh and id tokens when a refresh response omits them.
    pub(crate) fn carry_forward(mut self, previous: &TokenSet) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        if self.id_token.is_none() {
            self.id_token = previous.id_token.clone();
        }
        self
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn token(&self, kind: TokenKind) -> Option<&str> {
        match kind {
            TokenKind::Access => Some(self.access_token.as_str()),
            TokenKind::Id => self.id_token.as_deref(),
        }
    }
}

/// The unverified `exp` of a freshly received access token.
fn expiry_claim(access_token: &str) -> Option<DateTime<Utc>> {
    ras_identity_jwks::peek_claims(access_token)
        .ok()
        .and_then(|claims| claims.get("exp").and_then(|exp| exp.as_i64()))
        .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
}

/// Tokens whose claims can be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "access_token")]
    Access,
    #[serde(rename = "id_token")]
    Id,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Id => "id_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access_token" => Ok(TokenKind::Access),
            "id_token" => Ok(TokenKind::Id),
            other => Err(TokenError::InvalidTokenKind(other.to_string()).into()),
        }
    }
}

/// A single claim; `value` is `None` when the token doesn't carry it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub name: String,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub org_code: Option<String>,
    pub is_granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub org_code: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub org_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOrganizations {
    pub org_codes: Vec<String>,
}

/// Profile fields from the id token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub id: Option<String>,
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Type tag of a feature flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagType {
    #[serde(rename = "s", alias = "string")]
    String,
    #[serde(rename = "i", alias = "integer")]
    Integer,
    #[serde(rename = "b", alias = "boolean")]
    Boolean,
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlagType::String => "string",
            FlagType::Integer => "integer",
            FlagType::Boolean => "boolean",
        })
    }
}

/// A resolved feature flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub code: String,
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub flag_type: Option<FlagType>,
    /// True when the flag was absent and the caller's default was used
    pub is_default: bool,
}
