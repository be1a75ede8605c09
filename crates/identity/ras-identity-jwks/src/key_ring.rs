//! Process-wide cache of provider signing keys, keyed by key id.

use crate::error::{JwksError, JwksResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

static KEY_RINGS: LazyLock<DashMap<String, Arc<KeyRing>>> = LazyLock::new(DashMap::new);

/// A public key published by the provider.
pub struct SigningKey {
    pub kid: String,
    pub fetched_at: DateTime<Utc>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

/// Lazily populated key set for a single JWKS endpoint.
///
/// Lookups take the read lock only. A miss on an unknown `kid` re-fetches the
/// whole set once; concurrent misses queue on `fetch_lock` and reuse the result
/// of the fetch that completed while they waited instead of issuing their own.
/// That includes a failed fetch: its error is handed to everyone queued behind
/// it, and only later callers try the endpoint again.
/// Fetched keys are merged into the cache, so keys that disappear from the
/// published set keep verifying tokens that were signed before the rotation.
pub struct KeyRing {
    jwks_url: String,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, Arc<SigningKey>>>,
    /// Serializes fetches and holds the error of the last attempt, if it failed.
    fetch_lock: Mutex<Option<JwksError>>,
    attempt_count: AtomicU64,
    fetch_count: AtomicU64,
}

impl KeyRing {
    pub fn new(jwks_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            http,
            keys: RwLock::new(HashMap::new()),
            fetch_lock: Mutex::new(None),
            attempt_count: AtomicU64::new(0),
            fetch_count: AtomicU64::new(0),
        }
    }

    /// Returns the process-wide key ring for `jwks_url`, creating it on first use.
    ///
    /// The HTTP client of the first caller is the one used for all fetches.
    pub fn shared(jwks_url: &str, http: &reqwest::Client) -> Arc<Self> {
        KEY_RINGS
            .entry(jwks_url.to_string())
            .or_insert_with(|| Arc::new(Self::new(jwks_url, http.clone())))
            .clone()
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Number of successful key set fetches so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Acquire)
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    /// Look up a key by `kid`, fetching the key set on a miss.
    pub async fn get(&self, kid: &str) -> JwksResult<Arc<SigningKey>> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        let seen = self.attempt_count.load(Ordering::Acquire);
        let mut last_error = self.fetch_lock.lock().await;

        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        if self.attempt_count.load(Ordering::Acquire) == seen {
            debug!("Key '{}' not cached, fetching key set", kid);
            self.fetch_attempt(&mut last_error).await?;
        } else if let Some(err) = last_error.as_ref() {
            debug!("Key set fetch failed while waiting for '{}'", kid);
            return Err(err.clone());
        } else {
            debug!("Key set was refreshed while waiting for '{}'", kid);
        }

        self.cached(kid)
            .await
            .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))
    }

    /// Unconditionally re-fetch the key set. Returns the number of keys cached.
    pub async fn refresh(&self) -> JwksResult<usize> {
        let mut last_error = self.fetch_lock.lock().await;
        self.fetch_attempt(&mut last_error).await
    }

    async fn cached(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.read().await.get(kid).cloned()
    }

    async fn fetch_attempt(&self, last_error: &mut Option<JwksError>) -> JwksResult<usize> {
        let result = self.fetch_and_merge().await;
        *last_error = result.as_ref().err().cloned();
        self.attempt_count.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn fetch_and_merge(&self) -> JwksResult<usize> {
        let set = self.fetch().await?;
        let fetched_at = Utc::now();

        let mut fresh = Vec::with_capacity(set.keys.len());
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping key without 'kid'");
                continue;
            };
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }
            match DecodingKey::from_jwk(jwk) {
                Ok(decoding_key) => fresh.push(SigningKey {
                    kid,
                    fetched_at,
                    decoding_key,
                }),
                Err(e) => warn!("Skipping unusable key '{}': {}", kid, e),
            }
        }

        let mut keys = self.keys.write().await;
        for key in fresh {
            keys.insert(key.kid.clone(), Arc::new(key));
        }
        self.fetch_count.fetch_add(1, Ordering::AcqRel);

        info!("Key set from {} now holds {} keys", self.jwks_url, keys.len());
        Ok(keys.len())
    }

    async fn fetch(&self) -> JwksResult<JwkSet> {
        debug!("Fetching key set from {}", self.jwks_url);

        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JwksError::Timeout
                } else {
                    JwksError::FetchFailed(format!("{}: {}", self.jwks_url, e))
                }
            })?;

        if !response.status().is_success() {
            return Err(JwksError::FetchFailed(format!(
                "{} returned status {}",
                self.jwks_url,
                response.status()
            )));
        }

        response.json::<JwkSet>().await.map_err(|e| {
            if e.is_timeout() {
                JwksError::Timeout
            } else {
                JwksError::FetchFailed(format!("invalid key set from {}: {}", self.jwks_url, e))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestSigner;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn jwks_server(signers: &[&TestSigner]) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestSigner::jwks(signers)))
            .mount(&server)
            .await;
        server
    }

    fn ring_for(server: &MockServer) -> KeyRing {
        KeyRing::new(
            format!("{}/.well-known/jwks.json", server.uri()),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_lazy_fetch_then_cached() {
        let signer = TestSigner::primary();
        let server = jwks_server(&[&signer]).await;
        let ring = ring_for(&server);

        assert!(ring.is_empty().await);
        assert_eq!(ring.fetch_count(), 0);

        let key = ring.get(signer.kid()).await.unwrap();
        assert_eq!(key.kid, signer.kid());
        ring.get(signer.kid()).await.unwrap();

        assert_eq!(ring.fetch_count(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_once() {
        let signer = TestSigner::primary();
        let server = jwks_server(&[&signer]).await;
        let ring = ring_for(&server);

        ring.get(signer.kid()).await.unwrap();
        let result = ring.get("no-such-key").await;

        assert!(matches!(result, Err(JwksError::KeyNotFound(kid)) if kid == "no-such-key"));
        assert_eq!(ring.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_rotation_keeps_previous_keys() {
        let primary = TestSigner::primary();
        let rotated = TestSigner::rotated();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestSigner::jwks(&[&primary])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestSigner::jwks(&[&rotated])))
            .mount(&server)
            .await;

        let ring = ring_for(&server);
        ring.get(primary.kid()).await.unwrap();
        ring.get(rotated.kid()).await.unwrap();

        assert_eq!(ring.len().await, 2);
        ring.get(primary.kid()).await.unwrap();
        assert_eq!(ring.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let signer = TestSigner::primary();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(TestSigner::jwks(&[&signer]))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ring = Arc::new(ring_for(&server));
        let mut handles = vec![];
        for _ in 0..8 {
            let ring = ring.clone();
            let kid = signer.kid().to_string();
            handles.push(tokio::spawn(async move { ring.get(&kid).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(ring.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let ring = ring_for(&server);
        let result = ring.get("any").await;

        assert!(matches!(result, Err(JwksError::FetchFailed(_))));
        assert_eq!(ring.fetch_count(), 0);

        // A later lookup tries the endpoint again
        assert!(ring.get("any").await.is_err());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let ring = Arc::new(ring_for(&server));
        let mut handles = vec![];
        for _ in 0..8 {
            let ring = ring.clone();
            handles.push(tokio::spawn(async move { ring.get("any").await }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(JwksError::FetchFailed(_))));
        }

        assert_eq!(ring.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_shared_ring_is_reused() {
        let http = reqwest::Client::new();
        let a = KeyRing::shared("https://shared.example.com/.well-known/jwks.json", &http);
        let b = KeyRing::shared("https://shared.example.com/.well-known/jwks.json", &http);
        let c = KeyRing::shared("https://other.example.com/.well-known/jwks.json", &http);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
