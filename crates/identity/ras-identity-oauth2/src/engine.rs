//! Token lifecycle state machine.
//!
//! [`TokenEngine`] holds what is shared by every session of one client: the
//! configuration, the HTTP client and the token verifier. Everything that
//! belongs to a single user lives in [`SessionState`], which the engine takes
//! by `&mut` so the caller decides how sessions are isolated and serialized.

use crate::authorize::build_authorization_url;
use crate::claims::{self, ClaimStore};
use crate::config::{ClientConfig, Endpoints, GrantKind};
use crate::error::{OAuth2Error, OAuth2Result, TokenError};
use crate::flags;
use crate::pkce::PkceChallenge;
use crate::types::{
    AuthUrlOptions, AuthorizationCallback, AuthorizationUrl, Claim, FeatureFlag, FlagType,
    Organization, Permission, Permissions, Role, TokenKind, TokenResponse, TokenSet, UserDetails,
    UserOrganizations,
};
use chrono::Utc;
use ras_identity_jwks::{ClaimMap, KeyRing, TokenVerifier};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Header identifying this client library to the provider
pub const SDK_HEADER: &str = "X-Client-SDK";
const SDK_IDENTIFIER: &str = concat!("Rust/", env!("CARGO_PKG_VERSION"));

/// Mutable token state of one session.
#[derive(Debug, Default)]
pub struct SessionState {
    tokens: Option<Arc<TokenSet>>,
    generation: u64,
    claims: ClaimStore,
    last_authorization: Option<AuthorizationUrl>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens(&self) -> Option<&Arc<TokenSet>> {
        self.tokens.as_ref()
    }

    /// The most recently issued authorization URL and its state.
    pub fn last_authorization(&self) -> Option<&AuthorizationUrl> {
        self.last_authorization.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.as_ref().is_some_and(|t| !t.is_expired())
    }

    /// Swap in a new token set and drop every claim decoded from the old one.
    fn install(&mut self, tokens: TokenSet) -> Arc<TokenSet> {
        let tokens = Arc::new(tokens);
        self.tokens = Some(tokens.clone());
        self.generation += 1;
        self.claims.clear();
        tokens
    }

    fn clear_tokens(&mut self) {
        self.tokens = None;
        self.generation += 1;
        self.claims.clear();
    }

    fn reset(&mut self) {
        self.clear_tokens();
        self.last_authorization = None;
    }
}

pub struct TokenEngine {
    config: ClientConfig,
    endpoints: Endpoints,
    pkce: Option<PkceChallenge>,
    http: Client,
    verifier: TokenVerifier,
}

impl TokenEngine {
    /// Validate `config` and set up the shared HTTP client and key ring.
    pub fn new(config: ClientConfig) -> OAuth2Result<Self> {
        config.validate()?;

        // No idle connections are kept: the same client is driven from the
        // caller's runtime and from the runtimes owned by the blocking facades.
        let http = Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| OAuth2Error::Configuration(format!("HTTP client: {}", e)))?;

        let endpoints = config.endpoints();
        let key_ring = KeyRing::shared(&endpoints.jwks, &http);
        let verifier = TokenVerifier::new(key_ring).with_leeway(config.leeway);

        let pkce = match config.grant_kind {
            GrantKind::AuthorizationCodeWithPkce => {
                config.code_verifier.clone().map(PkceChallenge::from_verifier)
            }
            GrantKind::ClientCredentials | GrantKind::AuthorizationCode => None,
        };

        info!(
            "Token engine ready for {} ({} grant)",
            config.domain, config.grant_kind
        );

        Ok(Self {
            config,
            endpoints,
            pkce,
            http,
            verifier,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Build an authorization URL and record it as the session's pending login.
    pub fn authorization_url(
        &self,
        session: &mut SessionState,
        options: &AuthUrlOptions,
    ) -> OAuth2Result<AuthorizationUrl> {
        let built = build_authorization_url(
            &self.config,
            &self.endpoints.authorize,
            self.pkce.as_ref(),
            options,
        )?;

        debug!("Issued authorization URL for {}", self.config.client_id);
        session.last_authorization = Some(built.clone());
        Ok(built)
    }

    /// Obtain a token set for the configured grant and install it.
    ///
    /// Authorization code grants require the provider's callback; when the
    /// session recorded an issued state, the callback must carry the same one.
    pub async fn fetch(
        &self,
        session: &mut SessionState,
        callback: Option<AuthorizationCallback>,
    ) -> OAuth2Result<Arc<TokenSet>> {
        let mut form: Vec<(&str, String)> = Vec::new();

        match self.config.grant_kind {
            GrantKind::ClientCredentials => {
                form.push(("grant_type", "client_credentials".to_string()));
                if let Some(audience) = &self.config.audience {
                    form.push(("audience", audience.clone()));
                }
            }
            GrantKind::AuthorizationCode | GrantKind::AuthorizationCodeWithPkce => {
                let code = self.accept_callback(session, callback)?;
                form.push(("grant_type", "authorization_code".to_string()));
                form.push(("code", code));
                form.push(("redirect_uri", self.config.callback_url.clone()));

                if let GrantKind::AuthorizationCodeWithPkce = self.config.grant_kind {
                    let verifier = self.config.code_verifier.clone().ok_or_else(|| {
                        OAuth2Error::Configuration("PKCE grant requires a code verifier".into())
                    })?;
                    form.push(("code_verifier", verifier));
                }
            }
        }
        self.push_client_auth(&mut form);

        let response = self.request_tokens(&form).await?;
        let tokens = session.install(TokenSet::from_response(response, Utc::now()));
        session.last_authorization = None;

        info!("Obtained tokens via {} grant", self.config.grant_kind);
        Ok(tokens)
    }

    /// Exchange the refresh token for a new token set.
    ///
    /// The current token set stays in place if the exchange fails.
    pub async fn refresh(&self, session: &mut SessionState) -> OAuth2Result<Arc<TokenSet>> {
        let current = session.tokens.clone().ok_or(OAuth2Error::LoginRequired)?;
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(TokenError::MissingRefreshToken)?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ];
        self.push_client_auth(&mut form);

        let response = self.request_tokens(&form).await?;
        let tokens = TokenSet::from_response(response, Utc::now()).carry_forward(&current);
        let tokens = session.install(tokens);

        info!("Refreshed tokens");
        Ok(tokens)
    }

    /// Return a usable, unexpired token set, obtaining or refreshing as needed.
    pub async fn ensure_valid(&self, session: &mut SessionState) -> OAuth2Result<Arc<TokenSet>> {
        let current = session.tokens.clone();

        match self.config.grant_kind {
            GrantKind::ClientCredentials => match current {
                Some(tokens) if !tokens.is_expired() => Ok(tokens),
                _ => self.fetch(session, None).await,
            },
            GrantKind::AuthorizationCode | GrantKind::AuthorizationCodeWithPkce => {
                let tokens = current.ok_or(OAuth2Error::LoginRequired)?;
                if !tokens.is_expired() {
                    return Ok(tokens);
                }
                if tokens.refresh_token.is_none() {
                    warn!("Token set expired and holds no refresh token");
                    session.clear_tokens();
                    return Err(TokenError::MissingRefreshToken.into());
                }
                self.refresh(session).await
            }
        }
    }

    /// Forget the session's tokens and return the provider logout URL.
    pub fn logout(
        &self,
        session: &mut SessionState,
        redirect_target: Option<&str>,
    ) -> OAuth2Result<String> {
        session.reset();
        debug!("Session logged out");
        self.logout_url(redirect_target)
    }

    /// The provider logout URL, redirecting to `redirect_target` or the
    /// configured default.
    pub fn logout_url(&self, redirect_target: Option<&str>) -> OAuth2Result<String> {
        let mut url = Url::parse(&self.endpoints.logout)
            .map_err(|e| OAuth2Error::Configuration(format!("invalid logout endpoint: {}", e)))?;
        if let Some(target) = redirect_target.or(self.config.logout_redirect_url.as_deref()) {
            url.query_pairs_mut().append_pair("redirect", target);
        }
        Ok(url.to_string())
    }

    /// Install a token set persisted by the caller.
    pub fn restore(&self, session: &mut SessionState, tokens: TokenSet) -> Arc<TokenSet> {
        session.install(tokens)
    }

    pub fn token_set(&self, session: &SessionState) -> OAuth2Result<Arc<TokenSet>> {
        session.tokens.clone().ok_or(OAuth2Error::LoginRequired)
    }

    /// Verified claims of `kind`, decoded once per token set.
    pub async fn claims(
        &self,
        session: &mut SessionState,
        kind: TokenKind,
    ) -> OAuth2Result<Arc<ClaimMap>> {
        let tokens = self.ensure_valid(session).await?;
        let generation = session.generation;

        if let Some(cached) = session.claims.get(kind, generation) {
            return Ok(cached);
        }

        let token = tokens
            .token(kind)
            .ok_or(TokenError::MissingToken(kind.as_str()))?;
        let decoded = self.verifier.verify(token).await?;

        Ok(session.claims.insert(kind, generation, decoded))
    }

    pub async fn get_claim(
        &self,
        session: &mut SessionState,
        name: &str,
        kind: TokenKind,
    ) -> OAuth2Result<Claim> {
        let claims = self.claims(session, kind).await?;
        Ok(claims::claim(&claims, name))
    }

    pub async fn get_permission(
        &self,
        session: &mut SessionState,
        permission: &str,
    ) -> OAuth2Result<Permission> {
        let access = self.claims(session, TokenKind::Access).await?;
        Ok(claims::permission(&access, permission))
    }

    pub async fn get_permissions(&self, session: &mut SessionState) -> OAuth2Result<Permissions> {
        let access = self.claims(session, TokenKind::Access).await?;
        Ok(claims::permissions(&access))
    }

    pub async fn get_organization(
        &self,
        session: &mut SessionState,
    ) -> OAuth2Result<Organization> {
        let access = self.claims(session, TokenKind::Access).await?;
        Ok(claims::organization(&access))
    }

    pub async fn get_roles(&self, session: &mut SessionState) -> OAuth2Result<Vec<Role>> {
        let access = self.claims(session, TokenKind::Access).await?;
        Ok(claims::roles(&access))
    }

    pub async fn get_user_details(&self, session: &mut SessionState) -> OAuth2Result<UserDetails> {
        let id = self.claims(session, TokenKind::Id).await?;
        Ok(claims::user_details(&id))
    }

    pub async fn get_user_organizations(
        &self,
        session: &mut SessionState,
    ) -> OAuth2Result<UserOrganizations> {
        let id = self.claims(session, TokenKind::Id).await?;
        Ok(claims::user_organizations(&id))
    }

    pub async fn get_flag(
        &self,
        session: &mut SessionState,
        code: &str,
        default: Option<serde_json::Value>,
        expected: Option<FlagType>,
    ) -> OAuth2Result<FeatureFlag> {
        let access = self.claims(session, TokenKind::Access).await?;
        flags::resolve(&access, code, default, expected)
    }

    pub async fn get_boolean_flag(
        &self,
        session: &mut SessionState,
        code: &str,
        default: Option<bool>,
    ) -> OAuth2Result<bool> {
        let flag = self
            .get_flag(session, code, default.map(Into::into), Some(FlagType::Boolean))
            .await?;
        flags::as_bool(&flag)
    }

    pub async fn get_string_flag(
        &self,
        session: &mut SessionState,
        code: &str,
        default: Option<String>,
    ) -> OAuth2Result<String> {
        let flag = self
            .get_flag(session, code, default.map(Into::into), Some(FlagType::String))
            .await?;
        flags::as_string(&flag)
    }

    pub async fn get_integer_flag(
        &self,
        session: &mut SessionState,
        code: &str,
        default: Option<i64>,
    ) -> OAuth2Result<i64> {
        let flag = self
            .get_flag(session, code, default.map(Into::into), Some(FlagType::Integer))
            .await?;
        flags::as_integer(&flag)
    }

    fn accept_callback(
        &self,
        session: &SessionState,
        callback: Option<AuthorizationCallback>,
    ) -> OAuth2Result<String> {
        let callback = callback.ok_or_else(|| {
            OAuth2Error::Configuration(
                "authorization code grant requires the authorization response".to_string(),
            )
        })?;

        if let Some(error) = &callback.error {
            let description = callback
                .error_description
                .as_deref()
                .unwrap_or("No description");
            return Err(TokenError::Callback(format!("{}: {}", error, description)).into());
        }

        if let Some(issued) = &session.last_authorization {
            if callback.state.as_deref() != Some(issued.state.as_str()) {
                warn!("Callback state does not match the issued state");
                return Err(TokenError::StateMismatch.into());
            }
        }

        callback
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                OAuth2Error::Configuration(
                    "authorization response carries no code".to_string(),
                )
            })
    }

    fn push_client_auth(&self, form: &mut Vec<(&str, String)>) {
        form.push(("client_id", self.config.client_id.clone()));
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
    }

    async fn request_tokens(&self, form: &[(&str, String)]) -> OAuth2Result<TokenResponse> {
        let response = self
            .http
            .post(&self.endpoints.token)
            .header(SDK_HEADER, SDK_IDENTIFIER)
            .form(form)
            .send()
            .await
            .map_err(TokenError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token request failed with status {}", status);
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body = response.text().await.map_err(TokenError::from_reqwest)?;
        serde_json::from_str(&body)
            .map_err(|e| TokenError::InvalidResponse(e.to_string()).into())
    }
}
