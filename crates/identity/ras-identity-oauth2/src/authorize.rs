//! Authorization URL construction.

use crate::config::ClientConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::pkce::PkceChallenge;
use crate::types::{AuthUrlOptions, AuthorizationUrl};
use url::Url;
use uuid::Uuid;

/// Ordered query parameters where setting an existing key replaces its value.
#[derive(Debug, Default)]
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn set(&mut self, key: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.0.push((key.to_string(), value.to_string())),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Build the provider's authorize URL. Performs no I/O.
pub(crate) fn build_authorization_url(
    config: &ClientConfig,
    authorize_endpoint: &str,
    pkce: Option<&PkceChallenge>,
    options: &AuthUrlOptions,
) -> OAuth2Result<AuthorizationUrl> {
    let mut url = Url::parse(authorize_endpoint).map_err(|e| {
        OAuth2Error::Configuration(format!("invalid authorization endpoint: {}", e))
    })?;

    let mut params = QueryParams(url.query_pairs().into_owned().collect());

    let state = options
        .state
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    params.set("response_type", "code");
    params.set("client_id", &config.client_id);
    params.set("redirect_uri", &config.callback_url);
    params.set("scope", &config.scope);
    params.set("state", &state);

    if let Some(pkce) = pkce {
        params.set("code_challenge", &pkce.code_challenge);
        params.set("code_challenge_method", pkce.code_challenge_method);
    }
    if let Some(audience) = &config.audience {
        params.set("audience", audience);
    }
    if let Some(org_code) = &config.org_code {
        params.set("org_code", org_code);
    }
    if options.is_registration {
        params.set("start_page", "registration");
    }
    if options.is_create_org {
        params.set("is_create_org", "true");
    }

    for (key, value) in &options.additional_params {
        params.set(key, value);
    }

    // The caller may have overridden `state` through the extra parameters
    let state = params.get("state").unwrap_or(state.as_str()).to_string();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(params.0.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    Ok(AuthorizationUrl {
        url: url.to_string(),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrantKind;
    use std::collections::HashMap;

    const AUTHORIZE: &str = "https://acme.example.com/oauth2/auth";

    fn config(grant_kind: GrantKind) -> ClientConfig {
        ClientConfig::builder()
            .domain("https://acme.example.com")
            .client_id("client_abc")
            .callback_url("http://localhost:3000/callback")
            .grant_kind(grant_kind)
            .build()
    }

    fn query(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_required_parameters() {
        let built = build_authorization_url(
            &config(GrantKind::AuthorizationCode),
            AUTHORIZE,
            None,
            &AuthUrlOptions::default(),
        )
        .unwrap();

        let url = Url::parse(&built.url).unwrap();
        assert_eq!(url.host_str(), Some("acme.example.com"));
        assert_eq!(url.path(), "/oauth2/auth");

        let params = query(&built.url);
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client_abc");
        assert_eq!(params["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(params["scope"], "openid profile email offline");
        assert_eq!(params["state"], built.state);
        assert!(!params.contains_key("code_challenge"));
        assert!(!params.contains_key("audience"));
        assert!(!params.contains_key("start_page"));
    }

    #[test]
    fn test_pkce_audience_and_org() {
        let mut config = config(GrantKind::AuthorizationCodeWithPkce);
        config.audience = Some("api://orders".to_string());
        config.org_code = Some("org_123".to_string());
        let pkce = PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");

        let built =
            build_authorization_url(&config, AUTHORIZE, Some(&pkce), &AuthUrlOptions::default())
                .unwrap();

        let params = query(&built.url);
        assert_eq!(
            params["code_challenge"],
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["audience"], "api://orders");
        assert_eq!(params["org_code"], "org_123");
    }

    #[test]
    fn test_registration_and_create_org_combine() {
        let options = AuthUrlOptions::new().registration().create_org();
        let built = build_authorization_url(
            &config(GrantKind::AuthorizationCode),
            AUTHORIZE,
            None,
            &options,
        )
        .unwrap();

        let params = query(&built.url);
        assert_eq!(params["start_page"], "registration");
        assert_eq!(params["is_create_org"], "true");
    }

    #[test]
    fn test_explicit_state_is_deterministic() {
        let config = config(GrantKind::AuthorizationCode);
        let options = AuthUrlOptions::new().with_state("fixed-state");

        let first = build_authorization_url(&config, AUTHORIZE, None, &options).unwrap();
        let second = build_authorization_url(&config, AUTHORIZE, None, &options).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.state, "fixed-state");
    }

    #[test]
    fn test_generated_states_differ() {
        let config = config(GrantKind::AuthorizationCode);
        let options = AuthUrlOptions::default();

        let first = build_authorization_url(&config, AUTHORIZE, None, &options).unwrap();
        let second = build_authorization_url(&config, AUTHORIZE, None, &options).unwrap();

        assert!(!first.state.is_empty());
        assert!(!second.state.is_empty());
        assert_ne!(first.state, second.state);
    }

    #[test]
    fn test_additional_params_merge() {
        let options = AuthUrlOptions::new()
            .with_param("lang", "en")
            .with_param("scope", "openid");
        let built = build_authorization_url(
            &config(GrantKind::AuthorizationCode),
            "https://acme.example.com/oauth2/auth?prompt=login",
            None,
            &options,
        )
        .unwrap();

        let pairs: Vec<(String, String)> = Url::parse(&built.url)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect();

        // Existing endpoint parameters survive, overridden keys appear once
        assert!(pairs.contains(&("prompt".to_string(), "login".to_string())));
        assert!(pairs.contains(&("lang".to_string(), "en".to_string())));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "scope").count(), 1);
        assert_eq!(query(&built.url)["scope"], "openid");
    }

    #[test]
    fn test_state_override_through_params_is_returned() {
        let options = AuthUrlOptions::new().with_param("state", "from-params");
        let built = build_authorization_url(
            &config(GrantKind::AuthorizationCode),
            AUTHORIZE,
            None,
            &options,
        )
        .unwrap();

        assert_eq!(built.state, "from-params");
        assert_eq!(query(&built.url)["state"], "from-params");
    }
}
