//! Similarity fingerprint structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of every fingerprint in bits.
pub const FINGERPRINT_BITS: usize = 64;

/// A 64-bit similarity hash plus its LSH band keys.
///
/// `bits` stores the bit vector with position 0 in the most significant bit,
/// so `hash` (big-endian hex) and `bit_string()` read in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub hash: String,
    pub bits: u64,
    pub bands: Vec<String>,
    pub indexed_at: DateTime<Utc>,
}

impl Fingerprint {
    /// Bit at `position` (0..64) of the vector.
    pub fn bit(&self, position: usize) -> bool {
        debug_assert!(position < FINGERPRINT_BITS);
        (self.bits >> (FINGERPRINT_BITS - 1 - position)) & 1 == 1
    }

    /// The vector as 64 `'0'`/`'1'` characters.
    pub fn bit_string(&self) -> String {
        format!("{:064b}", self.bits)
    }

    /// Number of differing bit positions.
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        hamming_distance(self.bits, other.bits)
    }
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Parse a 64-character binary digit string.
pub fn parse_bit_string(s: &str) -> Option<u64> {
    if s.len() != FINGERPRINT_BITS || !s.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }
    u64::from_str_radix(s, 2).ok()
}

/// Parse a 16-digit hex fingerprint hash.
pub fn parse_hash(s: &str) -> Option<u64> {
    let bytes: [u8; 8] = hex::decode(s).ok()?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Big-endian hex encoding of a fingerprint vector.
pub fn encode_hash(bits: u64) -> String {
    hex::encode(bits.to_be_bytes())
}
