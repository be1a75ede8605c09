//! OAuth2/OIDC token lifecycle client.
//!
//! Builds authorization URLs (with optional PKCE), exchanges codes and client
//! credentials for tokens, refreshes them before use, and exposes the claims,
//! permissions and feature flags carried by JWKS-verified tokens.
//!
//! State is kept per user id in a [`SessionStore`], so one client can serve
//! many users at once. The same operations are offered three ways:
//!
//! - [`AsyncClient`]: awaitable, for async callers.
//! - [`BlockingClient`]: blocks the calling thread; refuses to run inside an
//!   async runtime.
//! - [`AdaptiveClient`]: blocking methods that also work on multi-thread
//!   runtime workers, plus `_async` twins.

#[macro_use]
mod macros;

mod adaptive;
mod authorize;
mod blocking;
mod claims;
mod client;
mod config;
mod engine;
mod error;
mod flags;
mod pkce;
mod runtime;
mod session;
mod types;


pub use adaptive::{AdaptiveClient, AdaptiveSession};
pub use blocking::{BlockingClient, BlockingSession};
pub use claims::ClaimStore;
pub use client::{AsyncClient, Session};
pub use config::{ClientConfig, Endpoints, GrantKind};
pub use engine::{SDK_HEADER, SessionState, TokenEngine};
pub use error::{OAuth2Error, OAuth2Result, RetrieveError, TokenError};
pub use pkce::PkceChallenge;
pub use session::SessionStore;
pub use types::{
    AuthUrlOptions, AuthorizationCallback, AuthorizationUrl, Claim, FeatureFlag, FlagType,
    Organization, Permission, Permissions, Role, TokenKind, TokenResponse, TokenSet, UserDetails,
    UserOrganizations,
};

// Re-export the verification layer for callers that check tokens directly
pub use ras_identity_jwks::{ClaimMap, JwksError, KeyRing, TokenVerifier};
