//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors produced while constructing or parsing address prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    /// Mask length outside 0..=32.
    #[error("Invalid mask length: /{0} (must be 0..=32)")]
    InvalidMaskLength(u8),

    /// The textual form did not parse as an address or CIDR.
    #[error("Invalid prefix: {0:?}")]
    InvalidPrefix(String),

    /// A range end address precedes its start.
    #[error("Invalid address range: end {end} precedes start {start}")]
    InvalidRange { start: String, end: String },
}
