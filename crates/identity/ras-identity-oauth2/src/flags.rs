//! Feature flag resolution from the `feature_flags` claim.
//!
//! The claim maps a flag code to `{ "t": <type tag>, "v": <value> }`; the long
//! forms `type`/`value` and `string`/`integer`/`boolean` are accepted as well.

use crate::error::{OAuth2Result, RetrieveError};
use crate::types::{FeatureFlag, FlagType};
use ras_identity_jwks::ClaimMap;
use serde::Deserialize;
use serde_json::Value;

pub(crate) const FEATURE_FLAGS_CLAIM: &str = "feature_flags";

#[derive(Debug, Deserialize)]
struct StoredFlag {
    #[serde(rename = "t", alias = "type", default)]
    flag_type: Option<FlagType>,
    #[serde(rename = "v", alias = "value")]
    value: Value,
}

/// `Ok(None)` when the flag is absent; an entry that exists but does not
/// decode is an error, never treated as absent.
fn stored_flag(access: &ClaimMap, code: &str) -> OAuth2Result<Option<StoredFlag>> {
    let Some(raw) = access
        .get(FEATURE_FLAGS_CLAIM)
        .and_then(Value::as_object)
        .and_then(|flags| flags.get(code))
    else {
        return Ok(None);
    };

    serde_json::from_value(raw.clone()).map(Some).map_err(|e| {
        RetrieveError::MalformedFlag {
            code: code.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Resolve `code`, substituting `default` when the flag is absent.
pub(crate) fn resolve(
    access: &ClaimMap,
    code: &str,
    default: Option<Value>,
    expected: Option<FlagType>,
) -> OAuth2Result<FeatureFlag> {
    let Some(flag) = stored_flag(access, code)? else {
        let value = default.ok_or_else(|| RetrieveError::FlagNotFound {
            code: code.to_string(),
        })?;
        return Ok(FeatureFlag {
            code: code.to_string(),
            value,
            flag_type: expected,
            is_default: true,
        });
    };

    if let (Some(stored), Some(requested)) = (flag.flag_type, expected) {
        if stored != requested {
            return Err(RetrieveError::FlagTypeMismatch {
                code: code.to_string(),
                stored,
                requested,
            }
            .into());
        }
    }

    Ok(FeatureFlag {
        code: code.to_string(),
        value: flag.value,
        flag_type: flag.flag_type.or(expected),
        is_default: false,
    })
}

pub(crate) fn as_bool(flag: &FeatureFlag) -> OAuth2Result<bool> {
    flag.value
        .as_bool()
        .ok_or_else(|| invalid(flag, FlagType::Boolean))
}

pub(crate) fn as_string(flag: &FeatureFlag) -> OAuth2Result<String> {
    flag.value
        .as_str()
        .map(String::from)
        .ok_or_else(|| invalid(flag, FlagType::String))
}

pub(crate) fn as_integer(flag: &FeatureFlag) -> OAuth2Result<i64> {
    flag.value
        .as_i64()
        .ok_or_else(|| invalid(flag, FlagType::Integer))
}

fn invalid(flag: &FeatureFlag, expected: FlagType) -> crate::error::OAuth2Error {
    RetrieveError::InvalidFlagValue {
        code: flag.code.clone(),
        expected,
    }
    .into()
}
