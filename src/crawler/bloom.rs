//! Bloom filter for visited-URL deduplication
//!
//! Append-only approximate set: `contains` may report false positives but
//! never false negatives. Bits live in a fixed array of atomic bytes, so
//! `add` and `contains` take `&self` and are safe under full concurrency.

use std::sync::atomic::{AtomicU8, Ordering};

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

/// Approximate set of visited URLs backed by a fixed-size bit array.
pub struct VisitedSet {
    bits: Vec<AtomicU8>,
    num_bits: usize,
    num_hashes: usize,
}

impl VisitedSet {
    /// Create a filter sized for `expected_items` at the given target
    /// false-positive rate.
    pub fn with_capacity(expected_items: usize, false_positive_rate: f64) -> Self {
        let num_bits = optimal_bits(expected_items, false_positive_rate);
        let num_hashes = optimal_hashes(num_bits, expected_items);
        Self::with_params(num_bits, num_hashes)
    }

    /// Create a filter with explicit parameters.
    pub fn with_params(num_bits: usize, num_hashes: usize) -> Self {
        let num_bits = num_bits.max(8);
        let num_bytes = num_bits.div_ceil(8);
        let mut bits = Vec::with_capacity(num_bytes);
        bits.resize_with(num_bytes, || AtomicU8::new(0));
        Self {
            bits,
            num_bits,
            num_hashes: num_hashes.max(1),
        }
    }

    /// Record a URL as visited.
    pub fn add(&self, url: &str) {
        let base = xxh3_64(url.as_bytes());
        for i in 0..self.num_hashes {
            let bit = self.bit_index(url, base, i);
            self.bits[bit / 8].fetch_or(1 << (bit % 8), Ordering::Relaxed);
        }
    }

    /// Check whether a URL may have been visited.
    /// `false` means definitely not; `true` means possibly.
    pub fn contains(&self, url: &str) -> bool {
        let base = xxh3_64(url.as_bytes());
        for i in 0..self.num_hashes {
            let bit = self.bit_index(url, base, i);
            if self.bits[bit / 8].load(Ordering::Relaxed) & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    /// Number of bits in the array.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Number of hash functions.
    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    /// The i-th probe combines the base hash with a seeded hash so the
    /// probes look independent while staying cheap to compute.
    fn bit_index(&self, url: &str, base: u64, i: usize) -> usize {
        let seeded = xxh3_64_with_seed(url.as_bytes(), i as u64);
        ((base ^ seeded) % self.num_bits as u64) as usize
    }
}

/// Optimal bit count: `m = ceil(-n * ln(p) / ln(2)^2)`.
pub fn optimal_bits(expected_items: usize, false_positive_rate: f64) -> usize {
    let n = expected_items.max(1) as f64;
    let p = if false_positive_rate > 0.0 && false_positive_rate < 1.0 {
        false_positive_rate
    } else {
        0.01
    };
    let ln2 = std::f64::consts::LN_2;
    (-n * p.ln() / (ln2 * ln2)).ceil() as usize
}

/// Optimal hash count: `k = (m/n) * ln(2)`, clamped to [1, 20].
pub fn optimal_hashes(num_bits: usize, expected_items: usize) -> usize {
    if expected_items == 0 || num_bits == 0 {
        return 3;
    }
    let k = (num_bits as f64 / expected_items as f64) * std::f64::consts::LN_2;
    (k.ceil() as usize).clamp(1, 20)
}
