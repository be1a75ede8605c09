//! Decoded-claims cache and fixed claim projections.

use crate::types::{
    Claim, Organization, Permission, Permissions, Role, TokenKind, UserDetails,
    UserOrganizations,
};
use ras_identity_jwks::ClaimMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Decoded claims per token kind, tagged with the token set generation they
/// were decoded from. An entry from an older generation is never returned.
#[derive(Debug, Default)]
pub struct ClaimStore {
    entries: HashMap<TokenKind, (u64, Arc<ClaimMap>)>,
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: TokenKind, generation: u64) -> Option<Arc<ClaimMap>> {
        self.entries
            .get(&kind)
            .filter(|(decoded_for, _)| *decoded_for == generation)
            .map(|(_, claims)| claims.clone())
    }

    pub fn insert(&mut self, kind: TokenKind, generation: u64, claims: ClaimMap) -> Arc<ClaimMap> {
        let claims = Arc::new(claims);
        self.entries.insert(kind, (generation, claims.clone()));
        claims
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn claim(claims: &ClaimMap, name: &str) -> Claim {
    Claim {
        name: name.to_string(),
        value: claims.get(name).cloned(),
    }
}

fn string_claim(claims: &ClaimMap, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(String::from)
}

fn string_list_claim(claims: &ClaimMap, name: &str) -> Vec<String> {
    claims
        .get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// From the access token
pub(crate) fn permissions(access: &ClaimMap) -> Permissions {
    Permissions {
        org_code: string_claim(access, "org_code"),
        permissions: string_list_claim(access, "permissions"),
    }
}

/// From the access token
pub(crate) fn permission(access: &ClaimMap, permission: &str) -> Permission {
    let Permissions {
        org_code,
        permissions,
    } = permissions(access);

    Permission {
        org_code,
        is_granted: permissions.iter().any(|p| p == permission),
    }
}

/// From the access token
pub(crate) fn organization(access: &ClaimMap) -> Organization {
    Organization {
        org_code: string_claim(access, "org_code"),
    }
}

/// From the access token; roles without a `key` are skipped
pub(crate) fn roles(access: &ClaimMap) -> Vec<Role> {
    access
        .get("roles")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match serde_json::from_value::<Role>(item.clone()) {
                    Ok(role) => Some(role),
                    Err(e) => {
                        debug!("Skipping role that cannot be decoded: {}", e);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// From the id token
pub(crate) fn user_details(id: &ClaimMap) -> UserDetails {
    UserDetails {
        id: string_claim(id, "sub"),
        given_name: string_claim(id, "given_name"),
        family_name: string_claim(id, "family_name"),
        email: string_claim(id, "email"),
        picture: string_claim(id, "picture"),
    }
}

/// From the id token
pub(crate) fn user_organizations(id: &ClaimMap) -> UserOrganizations {
    UserOrganizations {
        org_codes: string_list_claim(id, "org_codes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ClaimMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_store_respects_generation() {
        let mut store = ClaimStore::new();
        store.insert(TokenKind::Access, 1, map(json!({ "sub": "a" })));

        assert!(store.get(TokenKind::Access, 1).is_some());
        assert!(store.get(TokenKind::Access, 2).is_none());
        assert!(store.get(TokenKind::Id, 1).is_none());

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_claim_absent_is_not_an_error() {
        let claims = map(json!({ "org_code": "org_1" }));

        assert_eq!(claim(&claims, "org_code").value, Some(json!("org_1")));
        assert_eq!(
            claim(&claims, "missing"),
            Claim {
                name: "missing".to_string(),
                value: None
            }
        );
    }

    #[test]
    fn test_access_token_projections() {
        let access = map(json!({
            "org_code": "org_1",
            "permissions": ["read:orders", "write:orders"],
            "roles": [{ "id": "r1", "key": "admin", "name": "Admin" }, { "name": "no key" }]
        }));

        assert_eq!(
            permission(&access, "read:orders"),
            Permission {
                org_code: Some("org_1".to_string()),
                is_granted: true
            }
        );
        assert!(!permission(&access, "delete:orders").is_granted);
        assert_eq!(permissions(&access).permissions.len(), 2);
        assert_eq!(organization(&access).org_code.as_deref(), Some("org_1"));

        let roles = roles(&access);
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].key, "admin");
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_undecodable_role_is_logged() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();

        let access = map(json!({
            "roles": [{ "id": "r1", "key": "admin" }, { "id": "r2", "name": "Keyless" }]
        }));
        let decoded = tracing::subscriber::with_default(subscriber, || roles(&access));

        assert_eq!(decoded.len(), 1);
        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Skipping role that cannot be decoded"));
        assert!(output.contains("missing field"));
    }

    #[test]
    fn test_id_token_projections() {
        let id = map(json!({
            "sub": "kp_1",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "email": "ada@example.com",
            "org_codes": ["org_1", "org_2"]
        }));

        let details = user_details(&id);
        assert_eq!(details.id.as_deref(), Some("kp_1"));
        assert_eq!(details.given_name.as_deref(), Some("Ada"));
        assert!(details.picture.is_none());
        assert_eq!(user_organizations(&id).org_codes, vec!["org_1", "org_2"]);
        assert!(user_organizations(&ClaimMap::new()).org_codes.is_empty());
    }
}
