//! PKCE (RFC 7636) verifier and S256 challenge.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};
use sha2::{Digest, Sha256};

/// PKCE code challenge and verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a fresh verifier and its challenge.
    pub fn new() -> Self {
        Self::from_verifier(Self::generate_code_verifier())
    }

    /// Derive the challenge for an existing verifier, e.g. one taken from configuration.
    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let code_challenge = Self::generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256",
        }
    }

    /// 64 random bytes, base64url encoded (86 characters).
    pub fn generate_code_verifier() -> String {
        let mut rng = thread_rng();
        let bytes: Vec<u8> = (0..64).map(|_| rng.r#gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn generate_code_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}
