//! # Secure Randomness
//!
//! Source of random bytes for tokens and certificate serial numbers.
//!
//! The reconciler and issuers take a `SecureRandom` handle instead of reaching
//! for a global generator, so tests can substitute a seeded one.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to read randomness: {0}")]
pub struct RandomError(String);

/// Cryptographically secure random byte source
pub trait SecureRandom: Send + Sync + std::fmt::Debug {
    /// Fill `dest` completely with random bytes
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomError>;
}

/// Operating system randomness (`getrandom`)
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| RandomError(e.to_string()))
    }
}

/// Deterministic generator for tests
///
/// Only built for tests and with the `test-util` feature: the output is fully
/// determined by the seed.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug)]
pub struct SeededRandom {
    rng: std::sync::Mutex<rand::rngs::StdRng>,
}

#[cfg(any(test, feature = "test-util"))]
impl SeededRandom {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: std::sync::Mutex::new(rand::SeedableRng::seed_from_u64(seed)),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl SecureRandom for SeededRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|e| RandomError(format!("seeded generator poisoned: {e}")))?;
        rng.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_random_fills_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        OsRandom.fill(&mut a).unwrap();
        OsRandom.fill(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        SeededRandom::new(7).fill(&mut a).unwrap();
        SeededRandom::new(7).fill(&mut b).unwrap();
        assert_eq!(a, b);
    }
}
