// src/core/hash.rs

//! The hashing contract: map an arbitrary byte string to a 160-bit digest.
//!
//! The on-disk register encoding is pinned to SHA-1's bit layout (see
//! [`crate::core::persistence::header`]), but callers that don't care about
//! cross-implementation reproducibility can swap in any uniform 160-bit hash
//! by implementing [`Hasher160`] and using [`crate::HyperLogLog`]'s generic
//! form directly.

use sha1::{Digest, Sha1};

/// A hash function producing a 160-bit digest, interpreted as a big-endian
/// unsigned integer (bit 0 is the least-significant bit of the last byte).
pub trait Hasher160: Default + Clone {
    /// Hashes `bytes` into a 20-byte (160-bit) digest.
    fn digest(&self, bytes: &[u8]) -> [u8; 20];
}

/// The pinned default hasher: SHA-1 over the raw input bytes.
///
/// Substituting this for a different digest changes every register's
/// contents for a given input and therefore requires a new file format
/// version.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha1Hasher;

impl Hasher160 for Sha1Hasher {
    fn digest(&self, bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let h = Sha1Hasher;
        assert_eq!(h.digest(b"hello"), h.digest(b"hello"));
    }

    #[test]
    fn digest_matches_known_sha1() {
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89
        let h = Sha1Hasher;
        let digest = h.digest(b"abc");
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, "a9993e364706816aba3e25717850c26c9cd0d89");
    }

    #[test]
    fn distinct_inputs_usually_differ() {
        let h = Sha1Hasher;
        assert_ne!(h.digest(b"a"), h.digest(b"b"));
    }
}
