//! Nibble-entropy estimator for payloads that defeat signature matching.
//!
//! Encrypted or compressed payload has a near-uniform nibble distribution;
//! plaintext protocols concentrate in the ASCII range. The estimator takes
//! the most frequent nibble, widens its count by a confidence term, and
//! converts the resulting probability bound to bits. All constants are
//! tuned values; changing them changes classification outcomes.

/// Entropy estimate scaled to 0..=100.
pub fn entropy_pct(sample: &[u8]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut bins = [0u32; 16];
    for &b in sample {
        bins[(b >> 4) as usize] += 1;
        bins[(b & 0x0f) as usize] += 1;
    }
    let n = (sample.len() * 2) as f64;
    let max = bins.iter().copied().max().unwrap_or(0) as f64;
    let p = max / n;
    let bound = max + 2.3 * (n * p * (1.0 - p)).sqrt();
    let h = -(bound / n).log2();
    h * 25.0
}

/// Whether the sample looks encrypted.
pub fn looks_encrypted(sample: &[u8]) -> bool {
    entropy_pct(sample) > 80.0
}
