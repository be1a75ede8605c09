//! Fixed RSA keys for minting provider-style tokens in tests.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};

const PRIMARY_PEM: &str = include_str!("../testdata/primary_rsa.pem");
const PRIMARY_MODULUS: &str = "v7cNYtYc-ZklBhTYqmqCBaZY-e2z0M1a_-Fl4451ntR1BjH6KRUVDsX2vGYsInVcUJiTTKh_gFeMlAHh2rZLfnug-l-8Qw6XvEwGcmz88O5130X7VvoLKgL8j_CI7Mcq19zNUNHGJvkdr2FvUc4xv-_iCAdlB73i-oe_bXPRFnMldgKpd_WEidikSq9VHLZ4nwb70QO8AJPhJMwm5aiyb7ooOT7aM6rvf1q5oS5dYT5M5_76WNU4e_kT4aXAAo9lGMwMcH0uu5ZmixDndwusedLk5uAid_VJAnTEciWzmXu8MxF8Fi-FBdAk78zS9-RqxBvDEn31dijuKA_4VE5Aaw";

const ROTATED_PEM: &str = include_str!("../testdata/rotated_rsa.pem");
const ROTATED_MODULUS: &str = "j-VViMHb2N3Wx7BzsJpf2hgyQAqkEzUnxyDjnYBH5fOU8enfleaFPW6tX7vYfrl--xD3dGkexSoOf_uECxqfV9igG-3lJr54Y3Ms3OYlMehg0ANvcEilGyLRHH_jWmHot538l9lyLbrpPX0WkmzE2_c2lKQfSFEn_8XolIs9VymSZ50yNcfJPQSMZJy_102-NBl-2HklQCNZfhzKCEO5j_ps2cNfu8ziF_3J2ekDEa0DgluHNOUav9ZrWEN88J6hiv3y8psrtjaKBDnw3XzAcMstQoxTjPFx6z0oEqACxnxiVxXnfdE_8M-TCYTPQ6SRxvFY_IjkIM_UOAsxU-n5tw";

#[derive(Debug, Clone)]
pub struct TestSigner {
    kid: String,
    pem: &'static str,
    modulus: &'static str,
}

impl TestSigner {
    pub fn primary() -> Self {
        Self {
            kid: "test-key-1".to_string(),
            pem: PRIMARY_PEM,
            modulus: PRIMARY_MODULUS,
        }
    }

    pub fn rotated() -> Self {
        Self {
            kid: "test-key-2".to_string(),
            pem: ROTATED_PEM,
            modulus: ROTATED_MODULUS,
        }
    }

    /// Same key material published (or claimed) under a different key id.
    pub fn with_kid(&self, kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            ..self.clone()
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": self.kid,
            "n": self.modulus,
            "e": "AQAB"
        })
    }

    pub fn jwks(signers: &[&TestSigner]) -> Value {
        json!({ "keys": signers.iter().map(|s| s.jwk()).collect::<Vec<_>>() })
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        let key = EncodingKey::from_rsa_pem(self.pem.as_bytes()).expect("test key is valid PEM");
        encode(&header, claims, &key).expect("test claims encode")
    }
}

/// Unix timestamp `seconds` from now (negative for the past).
pub fn now_plus(seconds: i64) -> i64 {
    chrono::Utc::now().timestamp() + seconds
}
