//! # FL-01 Address Tree
//!
//! IPv4 CIDR classification trie for the flow labeler.
//!
//! ## Architecture
//!
//! This crate is the algorithmic core of address classification and keeps a
//! flat module layout (no I/O, no ports):
//!
//! - `node`: [`AddressNode`] and its status flags
//! - `trie`: [`AddressTrie`] arena storage, insertion with node
//!   splitting, the six [`MatchMode`] lookups, and the idle-timeout sweep
//! - `prune`: bottom-up attribute aggregation ([`PruneMode`])
//! - `locality`: hierarchical locality/ASN propagation
//!
//! ## Design
//!
//! Nodes live in an arena and are addressed by stable [`NodeId`] indices;
//! `parent` links are non-owning lookup aids used by propagation and
//! pruning, never for lifetime management. Splice operations therefore
//! never alias: they only rewrite indices.
//!
//! ## Invariants
//!
//! - **Branch invariant**: for every non-root node, `mask_len` strictly
//!   exceeds the parent's, and the node's prefix agrees with the parent's
//!   prefix under the parent's mask.
//! - `offset` always equals the parent's `mask_len` (0 at the root), so
//!   descent finds the next discriminating bit in O(1) per level.
//! - Recursion depth is bounded by `mask_len <= 32`.

pub mod error;
pub mod locality;
pub mod node;
pub mod prune;
pub mod trie;

pub use error::TreeError;
pub use node::{AddressNode, NodeAttrs, NodeStatus};
pub use prune::{LabelScope, PruneMode, PruneOptions};
pub use trie::{AddressTrie, MatchMode, NodeId};
