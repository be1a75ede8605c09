//! Client configuration.

use crate::error::{OAuth2Error, OAuth2Result};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// OAuth2 flow used to obtain tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    ClientCredentials,
    AuthorizationCode,
    AuthorizationCodeWithPkce,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::ClientCredentials => "client_credentials",
            GrantKind::AuthorizationCode => "authorization_code",
            GrantKind::AuthorizationCodeWithPkce => "authorization_code_with_pkce",
        }
    }
}

impl fmt::Display for GrantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantKind {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client_credentials" => Ok(GrantKind::ClientCredentials),
            "authorization_code" => Ok(GrantKind::AuthorizationCode),
            "authorization_code_with_pkce" | "pkce" => Ok(GrantKind::AuthorizationCodeWithPkce),
            other => Err(OAuth2Error::Configuration(format!(
                "unknown grant type '{}'",
                other
            ))),
        }
    }
}

/// Immutable client configuration, validated once by [`crate::TokenEngine::new`].
#[derive(Clone, Builder)]
pub struct ClientConfig {
    /// Base URL of the identity provider, e.g. `https://acme.example.com`
    #[builder(into)]
    pub domain: String,

    #[builder(into)]
    pub client_id: String,

    #[builder(into)]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    #[builder(into)]
    pub callback_url: String,

    #[builder(into, default = String::from("openid profile email offline"))]
    pub scope: String,

    #[builder(into)]
    pub audience: Option<String>,

    #[builder(into)]
    pub org_code: Option<String>,

    /// Required for [`GrantKind::AuthorizationCodeWithPkce`]
    #[builder(into)]
    pub code_verifier: Option<String>,

    pub grant_kind: GrantKind,

    /// Default redirect target for logout
    #[builder(into)]
    pub logout_redirect_url: Option<String>,

    /// Overrides `{domain}/.well-known/jwks.json`
    #[builder(into)]
    pub jwks_url: Option<String>,

    /// Timeout applied to every token and key set request
    #[builder(default = Duration::from_secs(30))]
    pub http_timeout: Duration,

    /// Clock skew allowance, in seconds, when checking token expiry
    #[builder(default = 0)]
    pub leeway: u64,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("callback_url", &self.callback_url)
            .field("scope", &self.scope)
            .field("audience", &self.audience)
            .field("org_code", &self.org_code)
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "<redacted>"))
            .field("grant_kind", &self.grant_kind)
            .field("logout_redirect_url", &self.logout_redirect_url)
            .field("jwks_url", &self.jwks_url)
            .field("http_timeout", &self.http_timeout)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from `<PREFIX>_*` environment variables.
    ///
    /// `DOMAIN`, `CLIENT_ID`, `CALLBACK_URL` and `GRANT_TYPE` are required;
    /// `CLIENT_SECRET`, `SCOPE`, `AUDIENCE`, `ORG_CODE`, `CODE_VERIFIER` and
    /// `LOGOUT_REDIRECT_URL` are optional.
    pub fn from_env(prefix: &str) -> OAuth2Result<Self> {
        let var = |name: &str| {
            std::env::var(format!("{}_{}", prefix, name))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };
        let required = |name: &str| {
            var(name).ok_or_else(|| {
                OAuth2Error::Configuration(format!("{}_{} is not set", prefix, name))
            })
        };

        let grant_kind: GrantKind = required("GRANT_TYPE")?.parse()?;

        Ok(Self::builder()
            .domain(required("DOMAIN")?)
            .client_id(required("CLIENT_ID")?)
            .maybe_client_secret(var("CLIENT_SECRET"))
            .callback_url(required("CALLBACK_URL")?)
            .maybe_scope(var("SCOPE"))
            .maybe_audience(var("AUDIENCE"))
            .maybe_org_code(var("ORG_CODE"))
            .maybe_code_verifier(var("CODE_VERIFIER"))
            .maybe_logout_redirect_url(var("LOGOUT_REDIRECT_URL"))
            .grant_kind(grant_kind)
            .build())
    }

    /// Check the configuration for missing or contradictory inputs.
    pub fn validate(&self) -> OAuth2Result<()> {
        let domain = Url::parse(&self.domain)
            .map_err(|e| OAuth2Error::Configuration(format!("invalid domain: {}", e)))?;
        if !matches!(domain.scheme(), "http" | "https") {
            return Err(OAuth2Error::Configuration(format!(
                "domain must be an http(s) URL, got '{}'",
                self.domain
            )));
        }

        if self.client_id.trim().is_empty() {
            return Err(OAuth2Error::Configuration("client id is empty".to_string()));
        }

        Url::parse(&self.callback_url)
            .map_err(|e| OAuth2Error::Configuration(format!("invalid callback URL: {}", e)))?;

        match self.grant_kind {
            GrantKind::ClientCredentials => {
                if self.client_secret.as_deref().is_none_or(str::is_empty) {
                    return Err(OAuth2Error::Configuration(
                        "client credentials grant requires a client secret".to_string(),
                    ));
                }
            }
            GrantKind::AuthorizationCode => {}
            GrantKind::AuthorizationCodeWithPkce => {
                if self.code_verifier.as_deref().is_none_or(str::is_empty) {
                    return Err(OAuth2Error::Configuration(
                        "PKCE grant requires a code verifier".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn endpoints(&self) -> Endpoints {
        let base = self.domain.trim_end_matches('/');
        Endpoints {
            authorize: format!("{}/oauth2/auth", base),
            token: format!("{}/oauth2/token", base),
            jwks: self
                .jwks_url
                .clone()
                .unwrap_or_else(|| format!("{}/.well-known/jwks.json", base)),
            logout: format!("{}/logout", base),
        }
    }
}

/// Provider endpoints derived from the configured domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize: String,
    pub token: String,
    pub jwks: String,
    pub logout: String,
}
