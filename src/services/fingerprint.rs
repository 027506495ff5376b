// src/services/fingerprint.rs

//! SimHash fingerprints over weighted character shingles.
//!
//! Each posting is reduced to a multiset of tagged shingles (`C:` company,
//! `T:` title, `D:` description). Field weights are applied by repeating a
//! field's shingles, so the hash itself stays unweighted. Two 32-bit hashes
//! per shingle (one unsalted, one salted) feed the 64 accumulator slots.
//!
//! The 64-bit vector is then cut into `num_bands` equal slices; each slice is
//! an index key. Near-duplicates within the Hamming threshold almost always
//! share at least one slice. `num_bands` and the duplicate threshold are
//! coupled and should be tuned together.

use std::collections::HashSet;

use chrono::Utc;

use crate::models::{FINGERPRINT_BITS, Fingerprint, PostingInput, Weights, encode_hash};
use crate::services::normalizer::{normalize_company, normalize_description, normalize_title};

const COMPANY_SHINGLE: usize = 3;
const TITLE_SHINGLE: usize = 3;
const DESCRIPTION_SHINGLE: usize = 5;

/// Appended before the second hash to decorrelate it from the first.
const SALT: &str = "\u{1f}simhash-salt";

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Builds fingerprints with a fixed weighting and band layout.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    weights: Weights,
    num_bands: usize,
}

impl FingerprintGenerator {
    /// `num_bands` must evenly divide 64; `Config::validate` enforces this.
    pub fn new(weights: Weights, num_bands: usize) -> Self {
        Self { weights, num_bands }
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    /// Fingerprint a posting, stamped with the current time.
    pub fn generate(&self, posting: &PostingInput) -> Fingerprint {
        let shingles = self.weighted_shingles(posting);
        let bits = simhash(&shingles);
        Fingerprint {
            hash: encode_hash(bits),
            bits,
            bands: band_keys(bits, self.num_bands),
            indexed_at: Utc::now(),
        }
    }

    /// The flat, weight-repeated multiset of tagged shingles.
    pub fn weighted_shingles(&self, posting: &PostingInput) -> Vec<String> {
        let fields = [
            (
                "C:",
                shingles(&normalize_company(&posting.company), COMPANY_SHINGLE),
                self.weights.company,
            ),
            (
                "T:",
                shingles(&normalize_title(&posting.title), TITLE_SHINGLE),
                self.weights.title,
            ),
            (
                "D:",
                shingles(
                    &normalize_description(&posting.description),
                    DESCRIPTION_SHINGLE,
                ),
                self.weights.description,
            ),
        ];

        let mut out = Vec::new();
        for (tag, field_shingles, weight) in fields {
            let tagged: Vec<String> = field_shingles
                .iter()
                .map(|s| format!("{tag}{s}"))
                .collect();
            for _ in 0..weight {
                out.extend(tagged.iter().cloned());
            }
        }
        out
    }
}

/// Distinct character n-grams of `text`, in first-seen order.
///
/// Text shorter than `n` is its own single shingle; empty text has none.
pub fn shingles(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() < n {
        return vec![text.to_string()];
    }

    let mut seen = HashSet::new();
    chars
        .windows(n)
        .map(|w| w.iter().collect::<String>())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Fold shingles into a 64-bit similarity hash.
///
/// Positions 0..32 come from the unsalted hash, 32..64 from the salted one.
pub fn simhash(shingles: &[String]) -> u64 {
    let mut acc = [0i64; FINGERPRINT_BITS];
    for shingle in shingles {
        let plain = hash32(shingle.as_bytes());
        let salted = hash32(format!("{shingle}{SALT}").as_bytes());
        for bit in 0..32 {
            acc[bit] += if (plain >> bit) & 1 == 1 { 1 } else { -1 };
            acc[32 + bit] += if (salted >> bit) & 1 == 1 { 1 } else { -1 };
        }
    }

    let mut out = 0u64;
    for (position, &weight) in acc.iter().enumerate() {
        if weight > 0 {
            out |= 1u64 << (FINGERPRINT_BITS - 1 - position);
        }
    }
    out
}

/// Split the vector into contiguous equal slices, keyed `"{band}:{hex}"`.
pub fn band_keys(bits: u64, num_bands: usize) -> Vec<String> {
    let width = FINGERPRINT_BITS / num_bands;
    let digits = width.div_ceil(4);
    let mask = if width == FINGERPRINT_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };

    (0..num_bands)
        .map(|band| {
            let shift = FINGERPRINT_BITS - (band + 1) * width;
            let slice = (bits >> shift) & mask;
            format!("{band}:{slice:0digits$x}")
        })
        .collect()
}

/// 32-bit FNV-1a.
fn hash32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ byte as u32).wrapping_mul(FNV_PRIME)
    })
}
