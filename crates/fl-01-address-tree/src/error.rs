//! Error types for the address tree.

use shared_types::PrefixError;
use thiserror::Error;

/// Errors surfaced by trie mutation.
///
/// Lookup misses are not errors; `find` returns `Option`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(#[from] PrefixError),

    #[error("Conflicting {field} on duplicate insert of {prefix}: {existing:?} vs {incoming:?}")]
    ConflictingAttribute {
        prefix: String,
        field: &'static str,
        existing: String,
        incoming: String,
    },
}
