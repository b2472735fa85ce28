use std::fmt;

use http::HeaderValue;
use sha2::{Digest, Sha256};

use crate::{IdentitySeed, ScrubRules};

/// Number of hex characters kept from the SHA-256 digest (128 bits)
pub const FINGERPRINT_LEN: usize = 32;

/// Truncated hex SHA-256 of a response body
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `W/"<fingerprint>"`
    pub fn weak_etag(&self) -> HeaderValue {
        HeaderValue::from_str(&format!("W/\"{}\"", self.0))
            .expect("hex fingerprint is a valid header value")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Folds body chunks into a fingerprint as they arrive.
///
/// The hash state is only created on the first non-empty chunk, with the seed
/// (if any) fed before any body bytes as its big-endian `u64` length followed
/// by its bytes. An empty seed still differs from no seed. A body made only
/// of empty chunks yields no fingerprint.
#[derive(Clone)]
pub struct DigestAccumulator {
    seed: Option<IdentitySeed>,
    scrub: Option<ScrubRules>,
    hasher: Option<Sha256>,
}

impl DigestAccumulator {
    /// `scrub` is `None` when the content type isn't scrubbable
    pub fn new(seed: Option<IdentitySeed>, scrub: Option<ScrubRules>) -> Self {
        Self {
            seed,
            scrub,
            hasher: None,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let seed = &self.seed;
        let hasher = self.hasher.get_or_insert_with(|| {
            let mut h = Sha256::new();
            if let Some(seed) = seed {
                let seed = seed.as_bytes();
                h.update((seed.len() as u64).to_be_bytes());
                h.update(seed);
            }
            h
        });
        match &self.scrub {
            Some(rules) => hasher.update(rules.apply(chunk)),
            None => hasher.update(chunk),
        }
    }

    pub fn finalize(self) -> Option<Fingerprint> {
        let digest = self.hasher?.finalize();
        Some(Fingerprint(hex::encode(&digest[..FINGERPRINT_LEN / 2])))
    }
}

impl fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAccumulator")
            .field("seeded", &self.seed.is_some())
            .field("scrub", &self.scrub)
            .field("started", &self.hasher.is_some())
            .finish()
    }
}
