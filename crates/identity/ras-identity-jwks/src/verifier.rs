//! RS256 verification of provider-issued tokens.

use crate::error::{JwksError, JwksResult};
use crate::key_ring::KeyRing;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decoded token payload.
pub type ClaimMap = serde_json::Map<String, serde_json::Value>;

/// Verifies signature and expiry of tokens against a [`KeyRing`].
///
/// Audience is deliberately not validated here. Callers that need audience
/// restriction compare the `aud` claim of the returned payload themselves.
#[derive(Clone)]
pub struct TokenVerifier {
    key_ring: Arc<KeyRing>,
    leeway: u64,
}

impl TokenVerifier {
    pub fn new(key_ring: Arc<KeyRing>) -> Self {
        Self {
            key_ring,
            leeway: 0,
        }
    }

    /// Clock skew allowance, in seconds, applied to `exp`.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    pub fn key_ring(&self) -> &Arc<KeyRing> {
        &self.key_ring
    }

    pub async fn verify(&self, token: &str) -> JwksResult<ClaimMap> {
        if token.trim().is_empty() {
            return Err(JwksError::EmptyToken);
        }

        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(JwksError::Validation(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header.kid.ok_or(JwksError::MissingKid)?;
        let key = self.key_ring.get(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.leeway = self.leeway;

        let data = decode::<ClaimMap>(token, key.decoding_key(), &validation).map_err(|e| {
            warn!("Token verification failed for kid '{}': {}", kid, e);
            JwksError::from(e)
        })?;

        debug!("Verified token signed with kid '{}'", kid);
        Ok(data.claims)
    }
}

/// Decode a token payload without checking its signature or expiry.
///
/// Only for reading metadata such as `exp` from a token that was just received
/// from the token endpoint; never for authorization decisions.
pub fn peek_claims(token: &str) -> JwksResult<ClaimMap> {
    if token.trim().is_empty() {
        return Err(JwksError::EmptyToken);
    }

    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ClaimMap>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestSigner, now_plus};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn verifier_for(signers: &[&TestSigner]) -> (MockServer, TokenVerifier) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestSigner::jwks(signers)))
            .mount(&server)
            .await;

        let ring = KeyRing::new(
            format!("{}/.well-known/jwks.json", server.uri()),
            reqwest::Client::new(),
        );
        (server, TokenVerifier::new(Arc::new(ring)))
    }

    #[tokio::test]
    async fn test_valid_token_returns_claims() {
        let signer = TestSigner::primary();
        let (_server, verifier) = verifier_for(&[&signer]).await;

        let token = signer.sign(&json!({
            "sub": "kp_123",
            "aud": ["some-other-api"],
            "exp": now_plus(300),
            "org_code": "org_abc"
        }));

        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims["sub"], "kp_123");
        assert_eq!(claims["org_code"], "org_abc");
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let signer = TestSigner::primary();
        let (_server, verifier) = verifier_for(&[&signer]).await;

        let token = signer.sign(&json!({ "sub": "kp_123", "exp": now_plus(-120) }));

        assert!(matches!(verifier.verify(&token).await, Err(JwksError::Expired)));
    }

    #[tokio::test]
    async fn test_leeway_accepts_recently_expired_token() {
        let signer = TestSigner::primary();
        let (_server, verifier) = verifier_for(&[&signer]).await;
        let verifier = verifier.with_leeway(300);

        let token = signer.sign(&json!({ "sub": "kp_123", "exp": now_plus(-120) }));

        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_signature_from_wrong_key_is_rejected() {
        let primary = TestSigner::primary();
        let rotated = TestSigner::rotated();
        let (_server, verifier) = verifier_for(&[&primary]).await;

        // Signed by the rotated key but claiming the primary key id
        let forged = rotated
            .with_kid(primary.kid())
            .sign(&json!({ "sub": "kp_123", "exp": now_plus(300) }));

        assert!(matches!(
            verifier.verify(&forged).await,
            Err(JwksError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_and_garbage() {
        let primary = TestSigner::primary();
        let rotated = TestSigner::rotated();
        let (_server, verifier) = verifier_for(&[&primary]).await;

        let token = rotated.sign(&json!({ "sub": "kp_123", "exp": now_plus(300) }));
        assert!(matches!(
            verifier.verify(&token).await,
            Err(JwksError::KeyNotFound(_))
        ));

        assert!(matches!(verifier.verify("").await, Err(JwksError::EmptyToken)));
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(JwksError::Malformed(_))
        ));
    }

    #[test]
    fn test_peek_claims_ignores_signature_and_expiry() {
        let signer = TestSigner::primary();
        let token = signer.sign(&json!({ "sub": "kp_1", "exp": now_plus(-3600) }));

        let claims = peek_claims(&token).unwrap();
        assert_eq!(claims["sub"], "kp_1");
        assert!(peek_claims("").is_err());
    }
}
