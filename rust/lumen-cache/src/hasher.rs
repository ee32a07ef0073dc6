//! Deterministic 128-bit content digest.
//!
//! The reference construction runs xxHash32 four times over the same input
//! with four distinct seeds and packs the four 32-bit outputs into a 16-byte
//! digest in a fixed, host-endianness-independent order. The digest is not
//! cryptographic: it exists purely to address content-addressed storage at
//! speed, never to resist a deliberate collision attempt.

use std::hash::Hasher as _;
use twox_hash::XxHash32;

/// The four seeds used to derive the 128-bit digest from four 32-bit
/// xxHash32 outputs. Changing these is a cache-format break: every digest
/// computed under the old seeds becomes unreachable under the new ones, so
/// a seed change must ship with cache-directory purge guidance.
const HASH_SEEDS: [u32; 4] = [0x9E3779B1, 0x85EBCA77, 0xC2B2AE3D, 0x27D4EB2F];

/// A 128-bit content digest. Value type: created by [`hash`], never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 16]);

impl Digest {
    /// Lowercase 32-character hex encoding, used for object filenames and
    /// the index's `object_path` field.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(32);
        for byte in self.0 {
            s.push_str(&format!("{:02x}", byte));
        }
        s
    }

    /// Parse a 32-character lowercase hex string back into a digest.
    /// Returns `None` if the input is not exactly 32 valid hex characters.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Digest(bytes))
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash an arbitrary byte slice into a 128-bit [`Digest`].
///
/// Deterministic across platforms and runs for identical input; never
/// fails, performs no I/O, and allocates nothing beyond the returned value.
pub fn hash(bytes: &[u8]) -> Digest {
    let mut out = [0u8; 16];
    for (i, seed) in HASH_SEEDS.iter().enumerate() {
        let mut hasher = XxHash32::with_seed(*seed);
        hasher.write(bytes);
        let word = (hasher.finish() as u32).to_le_bytes();
        out[i * 4..i * 4 + 4].copy_from_slice(&word);
    }
    Digest(out)
}
