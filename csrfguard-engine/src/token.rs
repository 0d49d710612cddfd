//! Random token and session id generation.

use crate::error::{CsrfError, Result};
use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Symbols tokens are drawn from, indexed by `byte % 62`.
const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of minted session ids.
pub const SESSION_ID_LENGTH: usize = 20;

/// Longest presented session id that is reused instead of replaced.
pub const MAX_SESSION_ID_LENGTH: usize = 128;

/// Alphanumeric token source backed by a reseedable CSPRNG.
///
/// The generator is shared by every request on the engine. Reseeding swaps
/// the whole RNG under the lock, so a concurrent `generate` sees either the
/// old or the new state, never a mix.
#[derive(Debug)]
pub struct TokenGenerator {
    rng: Mutex<StdRng>,
    min_length: usize,
    reseeds: AtomicU64,
}

impl TokenGenerator {
    pub fn new(min_length: usize) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            min_length,
            reseeds: AtomicU64::new(0),
        }
    }

    /// Deterministic generator for tests and benchmarks.
    pub fn from_seed(min_length: usize, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            min_length,
            reseeds: AtomicU64::new(0),
        }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Draw `length` alphanumeric characters.
    pub fn generate(&self, length: usize) -> Result<String> {
        if length < self.min_length {
            return Err(CsrfError::TokenTooShort {
                requested: length,
                minimum: self.min_length,
            });
        }
        Ok(self.draw(length))
    }

    /// Fresh session id; not subject to the token length floor.
    pub fn session_id(&self) -> String {
        self.draw(SESSION_ID_LENGTH)
    }

    /// Replace the RNG state with a new seed from the OS.
    pub fn reseed(&self) -> Result<()> {
        let fresh = StdRng::from_rng(OsRng).map_err(|e| CsrfError::Entropy(e.to_string()))?;
        *self.rng.lock() = fresh;
        let count = self.reseeds.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(reseeds = count, "token generator reseeded");
        Ok(())
    }

    /// Number of successful reseeds since construction.
    pub fn reseed_count(&self) -> u64 {
        self.reseeds.load(Ordering::Relaxed)
    }

    fn draw(&self, length: usize) -> String {
        let mut bytes = vec![0u8; length];
        self.rng.lock().fill_bytes(&mut bytes);
        bytes
            .into_iter()
            .map(|b| ALPHABET[usize::from(b) % ALPHABET.len()] as char)
            .collect()
    }
}
