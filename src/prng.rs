//! Deterministic index assignment for oracle sharding.
//!
//! Every index is the leading eight bytes of a domain-separated BLAKE2b-256
//! digest, reduced modulo the index domain.  The seed is a configuration
//! input, so repeated runs with the same configuration and registration
//! order reproduce the same assignments.  This spreads load between oracles;
//! it is not a source of unpredictability.

use crate::flight::FlightKey;
use crate::identity::Address;
use blake2::digest::{consts::U32, Digest};

type Blake2b256 = blake2::Blake2b<U32>;

const ORACLE_DOMAIN: &[u8] = b"SURETY_ORACLE_INDEX";
const REQUEST_DOMAIN: &[u8] = b"SURETY_REQUEST_INDEX";

/// Number of indices held by each oracle.
pub const INDICES_PER_ORACLE: usize = 3;

fn leading_u64(hasher: Blake2b256) -> u64 {
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(word)
}

/// Assigns index triples to oracles.
///
/// Each assignment is seeded from the configured seed, the oracle address,
/// the registration order and a generator-wide nonce that advances on every
/// assignment.
#[derive(Debug, Clone)]
pub struct IndexGenerator {
    seed: u64,
    nonce: u64,
    domain: u8,
}

impl IndexGenerator {
    /// Creates a generator drawing from `0..domain`.
    ///
    /// # Panics
    ///
    /// Panics if `domain` cannot hold [`INDICES_PER_ORACLE`] distinct values.
    pub fn new(seed: u64, domain: u8) -> Self {
        assert!(
            usize::from(domain) >= INDICES_PER_ORACLE,
            "index domain must hold {INDICES_PER_ORACLE} distinct values"
        );
        Self {
            seed,
            nonce: 0,
            domain,
        }
    }

    /// Size of the index domain.
    pub fn domain(&self) -> u8 {
        self.domain
    }

    /// Draws three distinct indices for `oracle`.  A draw that repeats an
    /// index already in the triple is discarded and the next draw is taken.
    pub fn assign(&mut self, oracle: &Address, registration: u64) -> [u8; INDICES_PER_ORACLE] {
        let nonce = self.nonce;
        self.nonce = self.nonce.wrapping_add(1);

        let modulus = u64::from(self.domain);
        let mut out = [0u8; INDICES_PER_ORACLE];
        let mut filled = 0;
        let mut draw: u32 = 0;
        while filled < INDICES_PER_ORACLE {
            let mut hasher = Blake2b256::new();
            hasher.update(ORACLE_DOMAIN);
            hasher.update(self.seed.to_be_bytes());
            hasher.update(oracle.as_bytes());
            hasher.update(registration.to_be_bytes());
            hasher.update(nonce.to_be_bytes());
            hasher.update(draw.to_be_bytes());
            draw = draw.wrapping_add(1);
            let candidate = (leading_u64(hasher) % modulus) as u8;
            if !out[..filled].contains(&candidate) {
                out[filled] = candidate;
                filled += 1;
            }
        }
        out
    }

    /// Index a status request for `flight` is sharded to.
    pub fn request_index(&self, flight: &FlightKey) -> u8 {
        request_index(self.seed, flight, self.domain)
    }
}

/// Derives the request index for `flight` under `seed` in `0..domain`.
///
/// # Panics
///
/// Panics if `domain` is zero.
pub fn request_index(seed: u64, flight: &FlightKey, domain: u8) -> u8 {
    assert!(domain != 0, "index domain is empty");
    let mut hasher = Blake2b256::new();
    hasher.update(REQUEST_DOMAIN);
    hasher.update(seed.to_be_bytes());
    hasher.update(flight.as_bytes());
    (leading_u64(hasher) % u64::from(domain)) as u8
}
