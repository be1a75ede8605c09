//! JSON Web Key Set support for OAuth2/OIDC clients.
//!
//! [`KeyRing`] fetches a provider's published signing keys on first use and
//! caches them by key id for the life of the process. [`TokenVerifier`] checks
//! RS256 signatures and expiry of provider-issued tokens against it.

mod error;
mod key_ring;
mod verifier;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{JwksError, JwksResult};
pub use key_ring::{KeyRing, SigningKey};
pub use verifier::{ClaimMap, TokenVerifier, peek_claims};
