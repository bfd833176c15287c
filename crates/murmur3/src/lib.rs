//! MurmurHash3 x64_128 with an incremental digest.
//!
//! Original algorithm by Austin Appleby. All rights to the original belong to the author.
//!
//! [`MurmurHash`] keeps the 128-bit state between appends: every append runs a
//! full MurmurHash3 pass over the new bytes, seeded with the current state. This
//! makes the digest order-sensitive, which is what content hashes of sampled
//! scene data want (`append(a); append(b)` differs from `append(b); append(a)`).

use std::fmt;

const C1: u64 = 0x87c37b91114253d5;
const C2: u64 = 0x4cf5ad432745937f;

/// Compute MurmurHash3 x64_128 of `data` with a 128-bit seed.
pub fn hash128_seeded(data: &[u8], seed: (u64, u64)) -> (u64, u64) {
    let (mut h1, mut h2) = seed;
    let blocks = data.chunks_exact(16);
    let tail = blocks.remainder();

    for block in blocks {
        let mut k1 = u64::from_le_bytes(le8(&block[0..8]));
        let mut k2 = u64::from_le_bytes(le8(&block[8..16]));

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(27).wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2.rotate_left(31).wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    // Tail: bytes 8..15 feed k2, bytes 0..7 feed k1.
    if tail.len() > 8 {
        let mut k2 = 0u64;
        for (i, &b) in tail[8..].iter().enumerate() {
            k2 ^= (b as u64) << (i * 8);
        }
        h2 ^= k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
    }
    if !tail.is_empty() {
        let mut k1 = 0u64;
        for (i, &b) in tail[..tail.len().min(8)].iter().enumerate() {
            k1 ^= (b as u64) << (i * 8);
        }
        h1 ^= k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
    }

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// Compute MurmurHash3 x64_128 with a zero seed.
#[inline]
pub fn hash128(data: &[u8]) -> (u64, u64) {
    hash128_seeded(data, (0, 0))
}

#[inline]
fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

/// Final mix function for 64-bit values.
#[inline]
fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

/// Incremental 128-bit digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MurmurHash {
    h1: u64,
    h2: u64,
}

impl MurmurHash {
    /// Fresh digest with zero state.
    pub const fn new() -> Self {
        Self { h1: 0, h2: 0 }
    }

    /// Construct from raw state words.
    pub const fn from_parts(h1: u64, h2: u64) -> Self {
        Self { h1, h2 }
    }

    /// Raw state words.
    #[inline]
    pub fn parts(&self) -> (u64, u64) {
        (self.h1, self.h2)
    }

    /// Mix raw bytes into the digest.
    pub fn append_bytes(&mut self, data: &[u8]) -> &mut Self {
        let (h1, h2) = hash128_seeded(data, (self.h1, self.h2));
        self.h1 = h1;
        self.h2 = h2;
        self
    }

    pub fn append_u64(&mut self, v: u64) -> &mut Self {
        self.append_bytes(&v.to_le_bytes())
    }

    pub fn append_i64(&mut self, v: i64) -> &mut Self {
        self.append_bytes(&v.to_le_bytes())
    }

    /// Floats are hashed by bit pattern, so `0.0` and `-0.0` differ.
    pub fn append_f64(&mut self, v: f64) -> &mut Self {
        self.append_bytes(&v.to_bits().to_le_bytes())
    }

    pub fn append_f64_slice(&mut self, v: &[f64]) -> &mut Self {
        let mut bytes = Vec::with_capacity(v.len() * 8);
        for x in v {
            bytes.extend_from_slice(&x.to_bits().to_le_bytes());
        }
        self.append_bytes(&bytes)
    }

    /// Strings are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn append_str(&mut self, s: &str) -> &mut Self {
        let mut bytes = Vec::with_capacity(8 + s.len());
        bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
        bytes.extend_from_slice(s.as_bytes());
        self.append_bytes(&bytes)
    }

    /// Fold another digest into this one.
    pub fn append_hash(&mut self, other: &MurmurHash) -> &mut Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&other.h1.to_le_bytes());
        bytes[8..16].copy_from_slice(&other.h2.to_le_bytes());
        self.append_bytes(&bytes)
    }

    /// Digest as 16 little-endian bytes.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.h1.to_le_bytes());
        out[8..16].copy_from_slice(&self.h2.to_le_bytes());
        out
    }
}

impl fmt::Display for MurmurHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.h1, self.h2)
    }
}

impl fmt::Debug for MurmurHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MurmurHash({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_zero_seed() {
        // No blocks, no tail, zero length: every mixing step keeps zero.
        assert_eq!(hash128(&[]), (0, 0));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(hash128(b"hello"), hash128(b"hello"));
        assert_ne!(hash128(b"hello"), hash128(b"hellp"));
    }

    #[test]
    fn test_tail_lengths_distinct() {
        // Exercise every tail length, including block-aligned input.
        let data: Vec<u8> = (0..48).collect();
        let mut seen = std::collections::HashSet::new();
        for n in 0..=data.len() {
            assert!(seen.insert(hash128(&data[..n])));
        }
    }

    #[test]
    fn test_incremental_order_sensitive() {
        let mut a = MurmurHash::new();
        a.append_str("ab").append_str("c");
        let mut b = MurmurHash::new();
        b.append_str("a").append_str("bc");
        assert_ne!(a, b);

        let mut c = MurmurHash::new();
        c.append_f64(1.0).append_f64(2.0);
        let mut d = MurmurHash::new();
        d.append_f64(2.0).append_f64(1.0);
        assert_ne!(c, d);
    }

    #[test]
    fn test_display_hex() {
        let h = MurmurHash::from_parts(1, 0xff);
        assert_eq!(h.to_string(), "000000000000000100000000000000ff");
        assert_eq!(h.to_bytes()[0], 1);
    }
}
