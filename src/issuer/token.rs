//! Plain field issuance: fixed values and random tokens

use crate::constants::TOKEN_LENGTH_BYTES;
use crate::crd::SecretClaimSpec;
use crate::random::{RandomError, SecureRandom};
use crate::store::SecretData;

/// Generate one token: 16 random bytes as 32 lowercase hex characters
///
/// # Errors
///
/// Returns `RandomError` if the random source cannot be read.
pub fn generate_token(rng: &dyn SecureRandom) -> Result<String, RandomError> {
    let mut bytes = [0u8; TOKEN_LENGTH_BYTES];
    rng.fill(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// Build the full payload of a non-X.509 claim
///
/// Fixed fields are copied as UTF-8 bytes, then every token field gets a fresh
/// value. A name listed in both ends up with the token.
///
/// # Errors
///
/// Returns `RandomError` if the random source cannot be read.
pub fn build_plain_fields(
    spec: &SecretClaimSpec,
    rng: &dyn SecureRandom,
) -> Result<SecretData, RandomError> {
    let mut data: SecretData = spec
        .fixed_fields
        .iter()
        .map(|(name, value)| (name.clone(), value.as_bytes().to_vec()))
        .collect();
    for field in &spec.token_fields {
        data.insert(field.clone(), generate_token(rng)?.into_bytes());
    }
    Ok(data)
}
