//! Async client facade and per-user session handle.

use crate::config::{ClientConfig, GrantKind};
use crate::engine::{SessionState, TokenEngine};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::session::SessionStore;
use crate::types::{
    AuthUrlOptions, AuthorizationCallback, AuthorizationUrl, Claim, FeatureFlag, FlagType,
    Organization, Permission, Permissions, Role, TokenKind, TokenSet, UserDetails,
    UserOrganizations,
};
use ras_identity_jwks::ClaimMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Engine and sessions shared by every facade handle of one client.
pub(crate) struct ClientCore {
    pub(crate) engine: TokenEngine,
    pub(crate) sessions: SessionStore,
}

impl ClientCore {
    pub(crate) fn new(config: ClientConfig) -> OAuth2Result<Arc<Self>> {
        Ok(Arc::new(Self {
            engine: TokenEngine::new(config)?,
            sessions: SessionStore::new(),
        }))
    }
}

/// Non-blocking client. Every operation is awaitable and only suspends on
/// network I/O.
#[derive(Clone)]
pub struct AsyncClient {
    core: Arc<ClientCore>,
}

impl AsyncClient {
    pub fn new(config: ClientConfig) -> OAuth2Result<Self> {
        Ok(Self {
            core: ClientCore::new(config)?,
        })
    }

    /// Handle bound to `user_id`; all operations through it touch only that
    /// user's tokens.
    pub fn session(&self, user_id: impl Into<String>) -> Session {
        Session::new(self.core.clone(), user_id.into())
    }

    /// Drop all state held for `user_id`.
    pub fn clear(&self, user_id: &str) -> bool {
        self.core.sessions.clear(user_id)
    }

    pub fn engine(&self) -> &TokenEngine {
        &self.core.engine
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.core.sessions
    }
}

/// A user's view of the client.
///
/// Operations on handles with the same user id are serialized; handles for
/// different ids proceed independently. Only login, token fetch and restore
/// create a session; reads on an unknown id report it as logged out.
#[derive(Clone)]
pub struct Session {
    core: Arc<ClientCore>,
    user_id: String,
}

type StateGuard = OwnedMutexGuard<SessionState>;

impl Session {
    pub(crate) fn new(core: Arc<ClientCore>, user_id: String) -> Self {
        Self { core, user_id }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn engine(&self) -> &TokenEngine {
        &self.core.engine
    }

    /// Lock this user's state, creating the session on first use.
    ///
    /// A session removed while we waited for its lock is never written to;
    /// the lookup starts over and finds (or creates) its replacement.
    async fn lock_or_create(&self) -> StateGuard {
        loop {
            let state = self.core.sessions.resolve(&self.user_id);
            let guard = state.clone().lock_owned().await;
            if self.core.sessions.is_current(&self.user_id, &state) {
                return guard;
            }
            debug!("Session was removed while waiting for its lock");
        }
    }

    /// Lock this user's state if a session exists.
    async fn lock_existing(&self) -> Option<(Arc<Mutex<SessionState>>, StateGuard)> {
        loop {
            let state = self.core.sessions.get(&self.user_id)?;
            let guard = state.clone().lock_owned().await;
            if self.core.sessions.is_current(&self.user_id, &state) {
                return Some((state, guard));
            }
        }
    }

    /// Lock the state an authenticated call works on. Client credentials
    /// sessions obtain tokens on demand; the other grants need a prior login.
    async fn lock_authenticated(&self) -> OAuth2Result<StateGuard> {
        match self.engine().config().grant_kind {
            GrantKind::ClientCredentials => Ok(self.lock_or_create().await),
            GrantKind::AuthorizationCode | GrantKind::AuthorizationCodeWithPkce => self
                .lock_existing()
                .await
                .map(|(_, guard)| guard)
                .ok_or(OAuth2Error::LoginRequired),
        }
    }

    pub async fn login_url(&self, options: AuthUrlOptions) -> OAuth2Result<AuthorizationUrl> {
        let mut state = self.lock_or_create().await;
        self.engine().authorization_url(&mut state, &options)
    }

    pub async fn register_url(&self, options: AuthUrlOptions) -> OAuth2Result<AuthorizationUrl> {
        self.login_url(options.registration()).await
    }

    /// Sign-up URL that also creates an organization for the new user.
    pub async fn create_org_url(
        &self,
        options: AuthUrlOptions,
    ) -> OAuth2Result<AuthorizationUrl> {
        self.login_url(options.registration().create_org()).await
    }

    pub async fn fetch_token(
        &self,
        callback: Option<AuthorizationCallback>,
    ) -> OAuth2Result<Arc<TokenSet>> {
        let mut state = self.lock_or_create().await;
        self.engine().fetch(&mut state, callback).await
    }

    pub async fn refresh(&self) -> OAuth2Result<Arc<TokenSet>> {
        let (_, mut state) = self.lock_existing().await.ok_or(OAuth2Error::LoginRequired)?;
        self.engine().refresh(&mut state).await
    }

    pub async fn ensure_valid(&self) -> OAuth2Result<Arc<TokenSet>> {
        let mut state = self.lock_authenticated().await?;
        self.engine().ensure_valid(&mut state).await
    }

    /// A token set is present and unexpired. Performs no network I/O.
    pub async fn is_authenticated(&self) -> OAuth2Result<bool> {
        Ok(match self.lock_existing().await {
            Some((_, state)) => state.is_authenticated(),
            None => false,
        })
    }

    pub async fn token_set(&self) -> OAuth2Result<Arc<TokenSet>> {
        let (_, state) = self.lock_existing().await.ok_or(OAuth2Error::LoginRequired)?;
        self.engine().token_set(&state)
    }

    /// Install a token set the caller persisted earlier.
    pub async fn restore(&self, tokens: TokenSet) -> OAuth2Result<Arc<TokenSet>> {
        let mut state = self.lock_or_create().await;
        Ok(self.engine().restore(&mut state, tokens))
    }

    /// Clear this user's tokens, remove the session, and return the provider
    /// logout URL. The caller performs the redirect.
    ///
    /// The session is removed before its lock is released, so operations
    /// queued behind the logout start from a fresh session.
    pub async fn logout(&self, redirect_target: Option<String>) -> OAuth2Result<String> {
        let Some((entry, mut state)) = self.lock_existing().await else {
            return self.engine().logout_url(redirect_target.as_deref());
        };

        let url = self.engine().logout(&mut state, redirect_target.as_deref());
        self.core.sessions.remove_if_current(&self.user_id, &entry);
        drop(state);
        url
    }

    pub async fn get_claims(&self, kind: TokenKind) -> OAuth2Result<Arc<ClaimMap>> {
        let mut state = self.lock_authenticated().await?;
        self.engine().claims(&mut state, kind).await
    }

    pub async fn get_claim(&self, name: &str, kind: TokenKind) -> OAuth2Result<Claim> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_claim(&mut state, name, kind).await
    }

    pub async fn get_permission(&self, permission: &str) -> OAuth2Result<Permission> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_permission(&mut state, permission).await
    }

    pub async fn get_permissions(&self) -> OAuth2Result<Permissions> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_permissions(&mut state).await
    }

    pub async fn get_organization(&self) -> OAuth2Result<Organization> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_organization(&mut state).await
    }

    pub async fn get_roles(&self) -> OAuth2Result<Vec<Role>> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_roles(&mut state).await
    }

    pub async fn get_user_details(&self) -> OAuth2Result<UserDetails> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_user_details(&mut state).await
    }

    pub async fn get_user_organizations(&self) -> OAuth2Result<UserOrganizations> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_user_organizations(&mut state).await
    }

    pub async fn get_flag(
        &self,
        code: &str,
        default: Option<serde_json::Value>,
        expected: Option<FlagType>,
    ) -> OAuth2Result<FeatureFlag> {
        let mut state = self.lock_authenticated().await?;
        self.engine()
            .get_flag(&mut state, code, default, expected)
            .await
    }

    pub async fn get_boolean_flag(&self, code: &str, default: Option<bool>) -> OAuth2Result<bool> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_boolean_flag(&mut state, code, default).await
    }

    pub async fn get_string_flag(
        &self,
        code: &str,
        default: Option<String>,
    ) -> OAuth2Result<String> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_string_flag(&mut state, code, default).await
    }

    pub async fn get_integer_flag(&self, code: &str, default: Option<i64>) -> OAuth2Result<i64> {
        let mut state = self.lock_authenticated().await?;
        self.engine().get_integer_flag(&mut state, code, default).await
    }
}
