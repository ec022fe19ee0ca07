//! Dedup filters — "have we already handled this identity?" per resource.
//!
//! The discovery loop only needs add / test / serialize, so the structure
//! behind it is pluggable. Two implementations ship:
//!
//! - [`BloomFilter`]: fixed memory, may report false positives (a peer is
//!   occasionally skipped), never false negatives.
//! - [`ExactFilter`]: a hash set, exact but grows with every identity.

use std::collections::HashSet;

use crate::config::DedupConfig;

/// Membership structure used to avoid re-processing remote identities.
pub trait DedupFilter: Send + Sync {
    /// Record an identity.
    fn add(&mut self, item: &[u8]);

    /// True if the identity was (probably) recorded before.
    fn test(&self, item: &[u8]) -> bool;

    /// Compact byte form, e.g. for diagnostics or handing to a tracker.
    fn serialize(&self) -> Vec<u8>;
}

/// Rebuild a filter from either serialized form.
///
/// Returns `None` for bytes neither implementation produced.
pub fn restore_filter(bytes: &[u8]) -> Option<Box<dyn DedupFilter>> {
    if let Some(exact) = ExactFilter::from_bytes(bytes) {
        return Some(Box::new(exact));
    }
    BloomFilter::from_bytes(bytes).map(|bloom| Box::new(bloom) as Box<dyn DedupFilter>)
}

/// Builds a fresh filter for each new resource.
pub type FilterFactory = std::sync::Arc<dyn Fn() -> Box<dyn DedupFilter> + Send + Sync>;

/// Factory producing Bloom filters sized from config.
pub fn bloom_factory(config: &DedupConfig) -> FilterFactory {
    let expected = config.expected_items;
    let fp_rate = config.false_positive_rate;
    std::sync::Arc::new(move || -> Box<dyn DedupFilter> {
        Box::new(BloomFilter::with_rate(expected, fp_rate))
    })
}

// ── Bloom ─────────────────────────────────────────────────────────────────────

const DOMAIN: &[u8] = b"swarmlink-dedup-v1";

/// Serialized header: hash count (u32 LE) + bit count (u64 LE).
const HEADER_LEN: usize = 12;

/// Classic Bloom filter with blake3-derived double hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size the filter for `expected_items` at the given false-positive rate.
    ///
    /// Out-of-range inputs are clamped rather than rejected.
    pub fn with_rate(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = if false_positive_rate.is_finite() {
            false_positive_rate.clamp(1e-9, 0.5)
        } else {
            0.01
        };
        let ln2 = std::f64::consts::LN_2;
        let m = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let k = ((m as f64 / n) * ln2).round().clamp(1.0, 32.0) as u32;
        Self::with_params(m, k)
    }

    fn with_params(num_bits: u64, num_hashes: u32) -> Self {
        let words = num_bits.div_ceil(64) as usize;
        Self {
            bits: vec![0; words],
            num_bits,
            num_hashes,
        }
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Rebuild a filter from [`DedupFilter::serialize`] output.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..HEADER_LEN)?;
        let num_hashes = u32::from_le_bytes(header[0..4].try_into().ok()?);
        let num_bits = u64::from_le_bytes(header[4..12].try_into().ok()?);
        if num_bits == 0 || num_hashes == 0 {
            return None;
        }
        let body = &bytes[HEADER_LEN..];
        let words = num_bits.div_ceil(64) as usize;
        if body.len() != words * 8 {
            return None;
        }
        let bits = body
            .chunks_exact(8)
            .map(|w| u64::from_le_bytes([w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7]]))
            .collect();
        Some(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    /// Bit positions for an item: h1 + i*h2 mod m.
    fn positions(&self, item: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN);
        hasher.update(item);
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&bytes[0..8]);
        h2.copy_from_slice(&bytes[8..16]);
        let h1 = u64::from_le_bytes(h1);
        // odd step so successive probes never collapse onto h1
        let h2 = u64::from_le_bytes(h2) | 1;
        let m = self.num_bits;
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }
}

impl DedupFilter for BloomFilter {
    fn add(&mut self, item: &[u8]) {
        let positions: Vec<u64> = self.positions(item).collect();
        for pos in positions {
            self.bits[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }
    }

    fn test(&self, item: &[u8]) -> bool {
        self.positions(item)
            .all(|pos| self.bits[(pos / 64) as usize] & (1u64 << (pos % 64)) != 0)
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bits.len() * 8);
        out.extend_from_slice(&self.num_hashes.to_le_bytes());
        out.extend_from_slice(&self.num_bits.to_le_bytes());
        for word in &self.bits {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }
}

// ── Exact ─────────────────────────────────────────────────────────────────────

/// Exact membership via a hash set.
#[derive(Debug, Clone, Default)]
pub struct ExactFilter {
    items: HashSet<Vec<u8>>,
}

impl ExactFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rebuild a filter from [`DedupFilter::serialize`] output.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let hexed: Vec<String> = serde_json::from_slice(bytes).ok()?;
        let items = hexed
            .iter()
            .map(hex::decode)
            .collect::<Result<HashSet<_>, _>>()
            .ok()?;
        Some(Self { items })
    }
}

impl DedupFilter for ExactFilter {
    fn add(&mut self, item: &[u8]) {
        self.items.insert(item.to_vec());
    }

    fn test(&self, item: &[u8]) -> bool {
        self.items.contains(item)
    }

    /// JSON array of hex-encoded items, sorted for stable output.
    fn serialize(&self) -> Vec<u8> {
        let mut hexed: Vec<String> = self.items.iter().map(hex::encode).collect();
        hexed.sort();
        serde_json::to_vec(&hexed).unwrap_or_default()
    }
}
