//! Context-aware client facade.
//!
//! Every operation exists twice: a blocking method and an `_async` twin for
//! callers that can await. The blocking method works outside any runtime and
//! on multi-thread runtime workers; on a current-thread runtime it fails with
//! a configuration error instead of stalling the scheduler.

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

#[derive(Clone)]
pub struct AdaptiveClient {
    core: Arc<ClientCore>,
    runtime: Arc<OwnedRuntime>,
}

impl AdaptiveClient {
    pub fn new(config: ClientConfig) -> OAuth2Result<Self> {
        Ok(Self {
            core: ClientCore::new(config)?,
            runtime: Arc::new(OwnedRuntime::new()?),
        })
    }

    pub fn session(&self, user_id: impl Into<String>) -> AdaptiveSession {
        AdaptiveSession {
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
pub struct AdaptiveSession {
    inner: Session,
    runtime: Arc<OwnedRuntime>,
}

impl AdaptiveSession {
    pub fn user_id(&self) -> &str {
        self.inner.user_id()
    }

    /// The async handle behind this session.
    pub fn as_async(&self) -> &Session {
        &self.inner
    }

    fn run<T, F, Fut>(&self, make_future: F) -> OAuth2Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OAuth2Result<T>>,
    {
        self.runtime.block_on_anywhere(make_future)
    }

    awaitable_methods! {
        fn login_url => login_url_async(options: AuthUrlOptions) -> AuthorizationUrl;
        fn register_url => register_url_async(options: AuthUrlOptions) -> AuthorizationUrl;
        fn create_org_url => create_org_url_async(options: AuthUrlOptions) -> AuthorizationUrl;
        fn fetch_token => fetch_token_async(callback: Option<AuthorizationCallback>) -> Arc<TokenSet>;
        fn refresh => refresh_async() -> Arc<TokenSet>;
        fn ensure_valid => ensure_valid_async() -> Arc<TokenSet>;
        fn is_authenticated => is_authenticated_async() -> bool;
        fn token_set => token_set_async() -> Arc<TokenSet>;
        fn restore => restore_async(tokens: TokenSet) -> Arc<TokenSet>;
        /// Returns the provider logout URL; the caller performs the redirect.
        fn logout => logout_async(redirect_target: Option<String>) -> String;
        fn get_claims => get_claims_async(kind: TokenKind) -> Arc<ClaimMap>;
        fn get_claim => get_claim_async(name: &str, kind: TokenKind) -> Claim;
        fn get_permission => get_permission_async(permission: &str) -> Permission;
        fn get_permissions => get_permissions_async() -> Permissions;
        fn get_organization => get_organization_async() -> Organization;
        fn get_roles => get_roles_async() -> Vec<Role>;
        fn get_user_details => get_user_details_async() -> UserDetails;
        fn get_user_organizations => get_user_organizations_async() -> UserOrganizations;
        fn get_flag => get_flag_async(code: &str, default: Option<serde_json::Value>, expected: Option<FlagType>) -> FeatureFlag;
        fn get_boolean_flag => get_boolean_flag_async(code: &str, default: Option<bool>) -> bool;
        fn get_string_flag => get_string_flag_async(code: &str, default: Option<String>) -> String;
        fn get_integer_flag => get_integer_flag_async(code: &str, default: Option<i64>) -> i64;
    }
}
