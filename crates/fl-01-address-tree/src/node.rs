//! Trie node type and status flags.

use std::ops::BitOr;
use std::time::Instant;

use shared_types::{Cidr, FlowRecord};

use crate::trie::NodeId;

/// Bit flags recording how a node entered the trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStatus(u32);

impl NodeStatus {
    /// No flags set.
    pub const EMPTY: NodeStatus = NodeStatus(0);
    /// The node came from configuration, as opposed to a branch node
    /// synthesized purely to fork two deeper prefixes.
    pub const CONFIGURED: NodeStatus = NodeStatus(0x01);
    /// The node was reached while importing configuration; pruning and
    /// display use this to judge eligibility.
    pub const VISITED: NodeStatus = NodeStatus(0x02);

    pub fn contains(self, other: NodeStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: NodeStatus) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeStatus) {
        self.0 &= !other.0;
    }
}

impl BitOr for NodeStatus {
    type Output = NodeStatus;

    fn bitor(self, rhs: NodeStatus) -> NodeStatus {
        NodeStatus(self.0 | rhs.0)
    }
}

/// Classification attributes attached to a trie node at insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttrs {
    /// Free-text or JSON label blob.
    pub label: Option<String>,
    /// Locality level; higher is more local/trusted, 0 unknown.
    pub locality: i32,
    /// Autonomous system number, 0 unknown.
    pub asn: u32,
    /// Two-letter country code, NUL padded; all-zero means unset.
    pub country: [u8; 4],
    /// Administrative grouping.
    pub group: Option<String>,
}

impl NodeAttrs {
    pub fn with_label(label: impl Into<String>) -> Self {
        NodeAttrs {
            label: Some(label.into()),
            ..NodeAttrs::default()
        }
    }

    pub fn with_country(cc: &str) -> Self {
        let mut country = [0u8; 4];
        for (dst, src) in country.iter_mut().zip(cc.bytes()) {
            *dst = src;
        }
        NodeAttrs {
            country,
            ..NodeAttrs::default()
        }
    }
}

/// One node of the address trie.
///
/// Children are owned by the arena; `parent` is a back-reference used only
/// for upward propagation and splicing.
#[derive(Debug, Clone)]
pub struct AddressNode {
    pub prefix: Cidr,
    pub parent: Option<NodeId>,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    /// Mask length of the nearest ancestor branch point; equals the
    /// parent's `mask_len`, 0 at the root.
    pub offset: u8,
    pub status: NodeStatus,
    pub locality: i32,
    pub asn: u32,
    pub country: [u8; 4],
    pub group: Option<String>,
    pub label: Option<String>,
    /// Snapshot of a representative flow, when the labeler attached one.
    pub record: Option<FlowRecord>,
    /// Last time the labeler touched this node; drives the idle sweep.
    pub last_used: Option<Instant>,
}

impl AddressNode {
    pub(crate) fn new(prefix: Cidr, attrs: NodeAttrs, status: NodeStatus) -> Self {
        AddressNode {
            prefix,
            parent: None,
            left: None,
            right: None,
            offset: 0,
            status,
            locality: attrs.locality,
            asn: attrs.asn,
            country: attrs.country,
            group: attrs.group,
            label: attrs.label,
            record: None,
            last_used: None,
        }
    }

    /// A synthetic branch node forking two deeper prefixes. Never counts
    /// as configured, whatever status the insertion is carrying.
    pub(crate) fn branch(prefix: Cidr, mut status: NodeStatus) -> Self {
        status.remove(NodeStatus::CONFIGURED);
        Self::new(prefix, NodeAttrs::default(), status)
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn is_configured(&self) -> bool {
        self.status.contains(NodeStatus::CONFIGURED)
    }

    /// The country code as text, if one is set.
    pub fn country_str(&self) -> Option<&str> {
        if self.country[0] == 0 {
            return None;
        }
        let len = self.country.iter().position(|&b| b == 0).unwrap_or(4);
        std::str::from_utf8(&self.country[..len]).ok()
    }
}
