//! Fixed-width perceptual hash values and their similarity metric.
//!
//! Hashes are 64-bit signatures (an 8×8 grid). Similarity between two hashes
//! is `1 - hamming / 64`, which is symmetric and exactly `1.0` for identical
//! values. The image-side computation lives in `livecheck-fingerprint`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Bit width of every perceptual hash.
pub const HASH_BITS: u32 = 64;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid perceptual hash \"{value}\": expected 16 hex digits")]
pub struct HashParseError {
    pub value: String,
}

/// A 64-bit perceptual hash, rendered as 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits.
    pub const fn hamming(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// `1 - hamming / HASH_BITS`.
    pub fn similarity(self, other: Self) -> f64 {
        1.0 - f64::from(self.hamming(other)) / f64::from(HASH_BITS)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for PerceptualHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 16 {
            return Err(HashParseError {
                value: s.to_owned(),
            });
        }
        u64::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|_| HashParseError {
                value: s.to_owned(),
            })
    }
}

impl Serialize for PerceptualHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PerceptualHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The three hash variants computed for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTriple {
    pub phash: PerceptualHash,
    pub ahash: PerceptualHash,
    pub dhash: PerceptualHash,
}

impl HashTriple {
    /// Mean of the per-variant similarities.
    pub fn similarity(&self, other: &Self) -> f64 {
        (self.phash.similarity(other.phash)
            + self.ahash.similarity(other.ahash)
            + self.dhash.similarity(other.dhash))
            / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(p: u64, a: u64, d: u64) -> HashTriple {
        HashTriple {
            phash: PerceptualHash::from_bits(p),
            ahash: PerceptualHash::from_bits(a),
            dhash: PerceptualHash::from_bits(d),
        }
    }

    #[test]
    fn self_similarity_is_exactly_one() {
        for bits in [0u64, 1, 0xdead_beef_0bad_f00d, u64::MAX] {
            let h = PerceptualHash::from_bits(bits);
            assert!((h.similarity(h) - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            (0u64, u64::MAX),
            (0x0f0f_0f0f_0f0f_0f0f, 0x00ff_00ff_00ff_00ff),
            (12_345, 67_890),
        ];
        for (a, b) in pairs {
            let ha = PerceptualHash::from_bits(a);
            let hb = PerceptualHash::from_bits(b);
            assert!((ha.similarity(hb) - hb.similarity(ha)).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn opposite_hashes_have_zero_similarity() {
        let a = PerceptualHash::from_bits(0);
        let b = PerceptualHash::from_bits(u64::MAX);
        assert_eq!(a.hamming(b), 64);
        assert!(a.similarity(b).abs() < f64::EPSILON);
    }

    #[test]
    fn single_bit_difference() {
        let a = PerceptualHash::from_bits(0b1000);
        let b = PerceptualHash::from_bits(0);
        assert!((a.similarity(b) - 63.0 / 64.0).abs() < 1e-12);
    }

    #[test]
    fn triple_similarity_averages_variants() {
        let a = triple(0, 0, 0);
        let b = triple(0, u64::MAX, 0);
        assert!((a.similarity(&b) - 2.0 / 3.0).abs() < 1e-12);
        assert!((a.similarity(&b) - b.similarity(&a)).abs() < f64::EPSILON);
    }

    #[test]
    fn display_is_sixteen_hex_digits() {
        assert_eq!(PerceptualHash::from_bits(0xab).to_string(), "00000000000000ab");
    }

    #[test]
    fn parse_accepts_display_output() {
        let h = PerceptualHash::from_bits(0x8f37_3714_acfc_f4d0);
        assert_eq!(h.to_string().parse::<PerceptualHash>().unwrap(), h);
    }

    #[test]
    fn parse_rejects_wrong_width_and_non_hex() {
        assert!("abc".parse::<PerceptualHash>().is_err());
        assert!("zzzzzzzzzzzzzzzz".parse::<PerceptualHash>().is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let t = triple(1, 2, 3);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(
            json,
            r#"{"phash":"0000000000000001","ahash":"0000000000000002","dhash":"0000000000000003"}"#
        );
    }
}
