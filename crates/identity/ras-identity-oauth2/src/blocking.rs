//! Blocking client facade for synchronous callers.

use crate::client::{ClientCore, Session};
use crate::config::ClientConfig;
use crate::error::OAuth2Result;
use crate::runtime::OwnedRuntime;
use crate::session::SessionStore;
use crate::types::{
    AuthUrlOptions, AuthorizationCallback, AuthorizationUrl, Claim, FeatureFlag, FlagType,
    Organization, Permission, Permissions, Role, TokenKind, TokenSet, UserDetails,
    UserOrganizations,
};
use ras_identity_jwks::ClaimMap;
use std::future::Future;
use std::sync::Arc;

/// Client whose operations block the calling thread until they finish.
///
/// Owns a private runtime. Calling it from inside an async runtime fails with
/// a configuration error; use [`crate::AsyncClient`] or
/// [`crate::AdaptiveClient`] there.
#[derive(Clone)]
pub struct BlockingClient {
    core: Arc<ClientCore>,
    runtime: Arc<OwnedRuntime>,
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> OAuth2Result<Self> {
        Ok(Self {
            core: ClientCore::new(config)?,
            runtime: Arc::new(OwnedRuntime::new()?),
        })
    }

    pub fn session(&self, user_id: impl Into<String>) -> BlockingSession {
        BlockingSession {
            inner: Session::new(self.core.clone(), user_id.into()),
            runtime: self.runtime.clone(),
        }
    }

    pub fn clear(&self, user_id: &str) -> bool {
        self.core.sessions.clear(user_id)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.core.sessions
    }
}

#[derive(Clone)]
pub struct BlockingSession {
    inner: Session,
    runtime: Arc<OwnedRuntime>,
}

impl BlockingSession {
    pub fn user_id(&self) -> &str {
        self.inner.user_id()
    }

    fn run<T, F, Fut>(&self, make_future: F) -> OAuth2Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OAuth2Result<T>>,
    {
        self.runtime.block_on(make_future)
    }

    blocking_methods! {
        fn login_url(options: AuthUrlOptions) -> AuthorizationUrl;
        fn register_url(options: AuthUrlOptions) -> AuthorizationUrl;
        fn create_org_url(options: AuthUrlOptions) -> AuthorizationUrl;
        fn fetch_token(callback: Option<AuthorizationCallback>) -> Arc<TokenSet>;
        fn refresh() -> Arc<TokenSet>;
        fn ensure_valid() -> Arc<TokenSet>;
        fn is_authenticated() -> bool;
        fn token_set() -> Arc<TokenSet>;
        fn restore(tokens: TokenSet) -> Arc<TokenSet>;
        /// Returns the provider logout URL; the caller performs the redirect.
        fn logout(redirect_target: Option<String>) -> String;
        fn get_claims(kind: TokenKind) -> Arc<ClaimMap>;
        fn get_claim(name: &str, kind: TokenKind) -> Claim;
        fn get_permission(permission: &str) -> Permission;
        fn get_permissions() -> Permissions;
        fn get_organization() -> Organization;
        fn get_roles() -> Vec<Role>;
        fn get_user_details() -> UserDetails;
        fn get_user_organizations() -> UserOrganizations;
        fn get_flag(code: &str, default: Option<serde_json::Value>, expected: Option<FlagType>) -> FeatureFlag;
        fn get_boolean_flag(code: &str, default: Option<bool>) -> bool;
        fn get_string_flag(code: &str, default: Option<String>) -> String;
        fn get_integer_flag(code: &str, default: Option<i64>) -> i64;
    }
}
