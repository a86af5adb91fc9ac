//! Cuckoo Filter implementation.
//!
//! A space-efficient probabilistic data structure used to test whether an
//! element is a member of a set. False positive matches are possible, but
//! false negatives are not. Unlike a Bloom filter, entries can be deleted
//! again.
//!
//! Each key is reduced to a small fingerprint stored in one of two candidate
//! buckets. When both candidates are full, an existing fingerprint is kicked
//! to its own alternate bucket to make room, up to a bounded number of
//! attempts. Exceeding the bound is a soft failure: the insert is reported
//! as unsuccessful and the filter stays intact.

use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::key::FilterKey;

/// Fingerprint slots per bucket.
const BUCKET_SIZE: usize = 4;

/// Target load factor used when sizing the bucket table.
const TARGET_LOAD_FACTOR: f64 = 0.9;

/// Seed for deriving the primary bucket index from the key hash.
const INDEX_SEED: u64 = 0x243F_6A88_85A3_08D3;

/// Seed for deriving the fingerprint from the key hash.
const FINGERPRINT_SEED: u64 = 0x1319_8A2E_0370_7344;

/// Seed for mixing a fingerprint into the alternate bucket index.
const ALT_INDEX_SEED: u64 = 0xA409_3822_299F_31D0;

/// CuckooFilter provides probabilistic set membership with deletion.
///
/// All hashing derives from the two-word hash pair the host supplies with
/// each [`FilterKey`]; the filter itself never touches the key bytes. The
/// first hash word seeds both candidate bucket indexes and the fingerprint,
/// so the same key always maps to the same slots no matter which call path
/// reaches the filter.
///
/// # Example
/// ```
/// use tablefilter::filter::{CuckooFilter, Filter};
/// use tablefilter::FilterKey;
///
/// let mut filter = CuckooFilter::new(1000, 0.01, 500).unwrap();
/// let key = FilterKey::new(b"row-1", [0x1234_5678, 0x9abc_def0]);
///
/// assert!(filter.add(&key));
/// assert!(filter.might_contain(&key));
/// assert!(filter.delete(&key));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuckooFilter {
    /// Bucket table; a zero slot is empty.
    buckets: Vec<[u16; BUCKET_SIZE]>,
    /// Fingerprint width in bits (4..=16).
    fingerprint_bits: u8,
    /// Eviction attempt bound per insert.
    max_kicks: usize,
    /// Number of fingerprints currently stored.
    count: u64,
    /// Victim-selection RNG state, persisted so reloads stay deterministic.
    rng_state: u64,
}

impl CuckooFilter {
    /// Create a new CuckooFilter sized for the expected number of keys and
    /// target false positive rate.
    ///
    /// # Arguments
    /// * `capacity` - Expected number of keys to be inserted
    /// * `false_positive_rate` - Desired false positive rate (e.g., 0.01 for 1%)
    /// * `max_kicks` - Eviction attempts before an insert is reported as overflow
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` for a zero capacity, a rate outside
    /// (0, 1), or a zero kick bound.
    pub fn new(capacity: usize, false_positive_rate: f64, max_kicks: usize) -> crate::Result<Self> {
        if capacity == 0 {
            return Err(crate::Error::invalid_argument("capacity must be > 0"));
        }
        if !false_positive_rate.is_finite()
            || false_positive_rate <= 0.0
            || false_positive_rate >= 1.0
        {
            return Err(crate::Error::invalid_argument(
                "false_positive_rate must be between 0 and 1",
            ));
        }
        if max_kicks == 0 {
            return Err(crate::Error::invalid_argument("max_kicks must be > 0"));
        }

        // With b slots per bucket and f fingerprint bits, the false positive
        // bound is roughly 2b / 2^f, so f >= log2(1/rate) + log2(2b).
        let fingerprint_bits = ((1.0 / false_positive_rate).log2().ceil() as i32 + 3)
            .clamp(4, 16) as u8;

        let bucket_count = ((capacity as f64 / BUCKET_SIZE as f64 / TARGET_LOAD_FACTOR).ceil()
            as usize)
            .max(2)
            .next_power_of_two();

        Ok(Self {
            buckets: vec![[0; BUCKET_SIZE]; bucket_count],
            fingerprint_bits,
            max_kicks,
            count: 0,
            rng_state: 0xD6E8_FD93_5E7A_4A6D,
        })
    }

    /// Number of fingerprints currently stored.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns true when no fingerprints are stored.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of buckets in the table.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Fingerprint width in bits.
    pub fn fingerprint_bits(&self) -> u8 {
        self.fingerprint_bits
    }

    /// Current slot utilization in `[0, 1]`.
    pub fn load_factor(&self) -> f64 {
        self.count as f64 / (self.buckets.len() * BUCKET_SIZE) as f64
    }

    /// Derive the fingerprint for a key. Zero marks an empty slot, so
    /// computed fingerprints are clamped to at least 1.
    fn fingerprint(&self, key: &FilterKey<'_>) -> u16 {
        let hash = splitmix64(key.hash()[0] ^ FINGERPRINT_SEED);
        let mask = if self.fingerprint_bits == 16 {
            u64::from(u16::MAX)
        } else {
            (1u64 << self.fingerprint_bits) - 1
        };

        ((hash & mask) as u16).max(1)
    }

    /// Primary candidate bucket for a key.
    fn primary_index(&self, key: &FilterKey<'_>) -> usize {
        (splitmix64(key.hash()[0] ^ INDEX_SEED) as usize) & (self.buckets.len() - 1)
    }

    /// Alternate bucket for a fingerprint at the given index. XOR with a
    /// mixed fingerprint keeps this an involution, so it is computable from
    /// a bucket slot alone during eviction.
    fn alternate_index(&self, index: usize, fingerprint: u16) -> usize {
        let mixed = splitmix64(u64::from(fingerprint) ^ ALT_INDEX_SEED) as usize;
        (index ^ mixed) & (self.buckets.len() - 1)
    }

    fn insert_into_bucket(&mut self, bucket_index: usize, fingerprint: u16) -> bool {
        for slot in &mut self.buckets[bucket_index] {
            if *slot == 0 {
                *slot = fingerprint;
                return true;
            }
        }
        false
    }

    fn remove_from_bucket(&mut self, bucket_index: usize, fingerprint: u16) -> bool {
        for slot in &mut self.buckets[bucket_index] {
            if *slot == fingerprint {
                *slot = 0;
                return true;
            }
        }
        false
    }

    fn bucket_contains(&self, bucket_index: usize, fingerprint: u16) -> bool {
        self.buckets[bucket_index].contains(&fingerprint)
    }

    fn next_random(&mut self) -> u64 {
        self.rng_state = splitmix64(self.rng_state.wrapping_add(0x9E37_79B9_7F4A_7C15));
        self.rng_state
    }
}

impl Filter for CuckooFilter {
    /// Check if a key may exist in the set.
    ///
    /// Returns `true` if the key might exist (with possible false positives).
    /// Returns `false` if the key definitely does not exist (no false
    /// negatives for keys whose add did not report overflow).
    fn might_contain(&self, key: &FilterKey<'_>) -> bool {
        let fingerprint = self.fingerprint(key);
        let index = self.primary_index(key);
        let alt = self.alternate_index(index, fingerprint);

        self.bucket_contains(index, fingerprint) || self.bucket_contains(alt, fingerprint)
    }

    /// Add a key to the filter.
    ///
    /// Returns `false` when both candidate buckets are full and the bounded
    /// eviction chain could not free a slot. A failed insert is rolled back,
    /// so only the rejected key itself goes unrepresented; every previously
    /// accepted key keeps answering `true`.
    fn add(&mut self, key: &FilterKey<'_>) -> bool {
        let mut fingerprint = self.fingerprint(key);
        let index = self.primary_index(key);
        let alt = self.alternate_index(index, fingerprint);

        if self.insert_into_bucket(index, fingerprint) || self.insert_into_bucket(alt, fingerprint)
        {
            self.count += 1;
            return true;
        }

        // Both candidates full: kick a random occupant to its alternate
        // bucket and take its slot, repeating up to the bound. The chain is
        // recorded so a failed insert can be rolled back; otherwise the
        // last evicted fingerprint would be lost and its key would turn
        // into a false negative.
        let mut bucket = if self.next_random() & 1 == 0 { index } else { alt };
        let mut kick_chain: Vec<(usize, usize)> = Vec::with_capacity(self.max_kicks);

        for _ in 0..self.max_kicks {
            let slot = (self.next_random() as usize) % BUCKET_SIZE;
            std::mem::swap(&mut fingerprint, &mut self.buckets[bucket][slot]);
            kick_chain.push((bucket, slot));
            bucket = self.alternate_index(bucket, fingerprint);

            if self.insert_into_bucket(bucket, fingerprint) {
                self.count += 1;
                return true;
            }
        }

        // Undo the evictions in reverse; the filter ends up exactly as it
        // was before this add.
        for &(bucket, slot) in kick_chain.iter().rev() {
            std::mem::swap(&mut fingerprint, &mut self.buckets[bucket][slot]);
        }

        log::debug!(
            "cuckoo filter overflow after {} kicks (load factor {:.3})",
            self.max_kicks,
            self.load_factor()
        );

        false
    }

    /// Remove one matching fingerprint from either candidate bucket.
    ///
    /// Returns `false` (and leaves the filter untouched) when no matching
    /// fingerprint is found, so deleting an unknown key is always safe.
    fn delete(&mut self, key: &FilterKey<'_>) -> bool {
        let fingerprint = self.fingerprint(key);
        let index = self.primary_index(key);
        let alt = self.alternate_index(index, fingerprint);

        if self.remove_from_bucket(index, fingerprint) || self.remove_from_bucket(alt, fingerprint)
        {
            self.count -= 1;
            return true;
        }

        false
    }
}

/// splitmix64 finalizer; fast, well-distributed mixing for index and
/// fingerprint derivation.
fn splitmix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
