//! # Bloom filter
//!
//! Probabilistic set membership with no false negatives: a fixed-size bit
//! array and `k` seeded hash positions per key.
//!
//! Every SSTable embeds one of these in its index sidecar. Point lookups
//! consult the filter first; a negative answer skips the table without
//! touching the offset map or the data file.
//!
//! The engine sizes filters at 10 bits per entry with 7 hashes, which lands
//! the false-positive rate around 1%.

use std::io::{self, Read, Write};

/// Largest serialized filter we will load: ~200 MB of bit bytes.
///
/// Anything above this is either corruption or a file written by an
/// incompatible build; the loader skips the filter and carries on.
pub const MAX_BLOOM_BITS: u64 = 200 * 1024 * 1024 * 8;

/// Stride mixed into the primary hash per seed. Large, odd, and borrowed
/// from the 64-bit golden ratio so consecutive seeds land far apart.
const SEED_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;

/// A bloom filter over byte-string keys.
///
/// Bits are stored one per byte (0/1), matching the on-disk layout exactly,
/// so serialization is a straight copy of the array.
pub struct BloomFilter {
    bits: Vec<u8>,
    num_hashes: u8,
}

impl BloomFilter {
    /// Creates an empty filter with `num_bits` positions and `num_hashes`
    /// probes per key. A zero-sized filter is clamped to one bit so the
    /// modulo in the hash never divides by zero.
    pub fn new(num_bits: u64, num_hashes: u8) -> Self {
        let len = num_bits.max(1) as usize;
        Self {
            bits: vec![0u8; len],
            num_hashes,
        }
    }

    /// Rebuilds a filter from its serialized bit array.
    pub fn from_parts(bits: Vec<u8>, num_hashes: u8) -> Self {
        let bits = if bits.is_empty() { vec![0u8] } else { bits };
        Self { bits, num_hashes }
    }

    /// Sets all `k` positions for `key`.
    pub fn add(&mut self, key: &[u8]) {
        let base = fnv1a_64(key);
        for seed in 0..self.num_hashes {
            let idx = self.position(base, seed);
            self.bits[idx] = 1;
        }
    }

    /// Returns `false` if `key` is definitely absent, `true` if it might be
    /// present.
    #[must_use]
    pub fn possibly_contains(&self, key: &[u8]) -> bool {
        let base = fnv1a_64(key);
        for seed in 0..self.num_hashes {
            if self.bits[self.position(base, seed)] == 0 {
                return false;
            }
        }
        true
    }

    /// Number of bit positions in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.bits.len() as u64
    }

    /// Number of hash probes per key.
    #[must_use]
    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    /// Serializes the filter.
    ///
    /// Layout (little-endian): `bit_count: u64`, `hash_count: u8`, then
    /// `bit_count` bytes each holding 0 or 1.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.bits.len() as u64).to_le_bytes())?;
        w.write_all(&[self.num_hashes])?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter written by [`write_to`](Self::write_to).
    ///
    /// Returns `Ok(None)` without consuming further bytes when the bit count
    /// is zero or exceeds [`MAX_BLOOM_BITS`]; the caller treats the table
    /// as filterless rather than failing the load.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Option<Self>> {
        let mut buf8 = [0u8; 8];
        r.read_exact(&mut buf8)?;
        let bit_count = u64::from_le_bytes(buf8);

        if bit_count == 0 || bit_count > MAX_BLOOM_BITS {
            return Ok(None);
        }

        let mut hash_buf = [0u8; 1];
        r.read_exact(&mut hash_buf)?;

        let mut bits = vec![0u8; bit_count as usize];
        r.read_exact(&mut bits)?;

        Ok(Some(Self::from_parts(bits, hash_buf[0])))
    }

    /// Seed-perturbed position: primary hash xor a seed-dependent stride,
    /// reduced modulo the bit count.
    fn position(&self, base: u64, seed: u8) -> usize {
        let mixed = base ^ (seed as u64).wrapping_mul(SEED_STRIDE);
        (mixed % self.bits.len() as u64) as usize
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.bits.len())
            .field("num_hashes", &self.num_hashes)
            .finish()
    }
}

/// FNV-1a 64-bit hash.
fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
