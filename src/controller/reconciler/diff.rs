//! # Diff
//!
//! Field-level comparison of a plain claim against its stored Secret.
//!
//! Fixed fields are live-synced: a missing or different value is rewritten.
//! Token fields are only ever filled in: once a token exists it is kept, even
//! if the claim changes around it.

use crate::crd::SecretClaimSpec;
use crate::issuer::generate_token;
use crate::jsonpatch::{self, PatchOperation};
use crate::random::{RandomError, SecureRandom};
use crate::store::SecretData;

/// Fields that must be written for `stored` to satisfy `spec`
///
/// # Errors
///
/// Returns `RandomError` if a missing token cannot be generated.
pub fn changed_fields(
    spec: &SecretClaimSpec,
    stored: &SecretData,
    rng: &dyn SecureRandom,
) -> Result<SecretData, RandomError> {
    let mut changed = SecretData::new();
    for (name, value) in &spec.fixed_fields {
        if stored.get(name).map(Vec::as_slice) != Some(value.as_bytes()) {
            changed.insert(name.clone(), value.as_bytes().to_vec());
        }
    }
    for field in &spec.token_fields {
        if !stored.contains_key(field) {
            changed.insert(field.clone(), generate_token(rng)?.into_bytes());
        }
    }
    Ok(changed)
}

/// Patch writing `changed` onto a Secret read at `resource_version`
///
/// The patch opens with a `test` of the resource version so it only applies
/// to the exact Secret the diff was computed against, then creates `/data`
/// when the Secret has none and adds one entry per changed field.
#[must_use]
pub fn patch_ops(
    changed: &SecretData,
    resource_version: Option<&str>,
    secret_has_data: bool,
) -> Vec<PatchOperation> {
    let mut ops = Vec::with_capacity(changed.len() + 2);
    if let Some(version) = resource_version {
        ops.push(jsonpatch::test_resource_version(version));
    }
    if !secret_has_data {
        ops.push(jsonpatch::add_empty_data());
    }
    ops.extend(
        changed
            .iter()
            .map(|(name, value)| jsonpatch::add_data_field(name, value)),
    );
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;
    use std::collections::BTreeMap;

    fn spec(tokens: &[&str], fixed: &[(&str, &str)]) -> SecretClaimSpec {
        SecretClaimSpec {
            token_fields: tokens.iter().map(ToString::to_string).collect(),
            fixed_fields: fixed
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
            x509: None,
        }
    }

    fn stored(entries: &[(&str, &str)]) -> SecretData {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_nothing_changed() {
        let claim = spec(&["token"], &[("user", "admin")]);
        let current = stored(&[("user", "admin"), ("token", "0123")]);
        let changed = changed_fields(&claim, &current, &SeededRandom::new(1)).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn test_changed_and_missing_fixed_fields() {
        let claim = spec(&[], &[("user", "root"), ("host", "db"), ("port", "5432")]);
        let current = stored(&[("user", "admin"), ("port", "5432")]);
        let changed = changed_fields(&claim, &current, &SeededRandom::new(1)).unwrap();
        assert_eq!(changed, stored(&[("user", "root"), ("host", "db")]));
    }

    #[test]
    fn test_existing_token_is_never_replaced() {
        let claim = spec(&["token", "new"], &[]);
        let current = stored(&[("token", "keep-me")]);
        let changed = changed_fields(&claim, &current, &SeededRandom::new(1)).unwrap();
        assert_eq!(changed.keys().collect::<Vec<_>>(), vec!["new"]);
        assert_eq!(changed["new"].len(), 32);
    }

    #[test]
    fn test_fields_not_in_claim_are_left_alone() {
        let claim = spec(&[], &[("user", "admin")]);
        let current = stored(&[("user", "admin"), ("added-by-someone-else", "x")]);
        let changed = changed_fields(&claim, &current, &SeededRandom::new(1)).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn test_patch_ops_guard_version_and_create_data_map_when_missing() {
        let changed = stored(&[("a", "1")]);
        let ops = patch_ops(&changed, Some("12"), false);
        assert_eq!(
            ops,
            vec![
                jsonpatch::test_resource_version("12"),
                jsonpatch::add_empty_data(),
                jsonpatch::add_data_field("a", b"1"),
            ]
        );

        let ops = patch_ops(&changed, Some("12"), true);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], jsonpatch::test_resource_version("12"));
        assert_eq!(
            serde_json::to_value(&ops[1]).unwrap()["value"],
            serde_json::json!("MQ==")
        );

        // Unversioned objects get no guard
        let ops = patch_ops(&changed, None, true);
        assert_eq!(ops, vec![jsonpatch::add_data_field("a", b"1")]);
    }
}
