//! The CIDR prefix trie: arena storage, match-mode lookup, insertion with
//! node splitting, and the idle-timeout sweep.
//!
//! Lookup never mutates; all structural mutation must be serialized by the
//! owner. Pruning and propagation touch unbounded subtrees, so one
//! exclusive lock per trie is the expected granularity.

use std::time::{Duration, Instant};

use shared_types::Cidr;
use tracing::debug;

use crate::error::TreeError;
use crate::node::{AddressNode, NodeAttrs, NodeStatus};

/// Stable arena index of a trie node.
///
/// Ids stay valid until the node is removed by pruning or the timeout
/// sweep; they are never invalidated by unrelated inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lookup flavors of [`AddressTrie::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The node whose `(address, mask_len)` equals the query's.
    Exact,
    /// The shallowest node containing the query with `mask_len >=` the
    /// query's; coarse-grained matches.
    Mask,
    /// Leaf match with the labeled-ancestor fallback; the label source
    /// used by flow enrichment.
    Node,
    /// Like `Exact`, but a leaf covering the query is accepted before the
    /// exact-address test ("is this covered by a configured network").
    Super,
    /// Classic longest-prefix match.
    Longest,
    /// First node reached, regardless of specificity.
    Any,
}

/// Tunable depth heuristics for `MatchMode::Node` (see `find`); tuned
/// values, not derived ones.
const NODE_MATCH_DEPTH: u8 = 16;
const NODE_MATCH_SLACK: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    /// Descent side for `addr` below a node of mask length `pos`: a set
    /// bit goes left, a clear bit right. This ordering is fixed; every
    /// splice in `place` relies on it.
    fn for_bit(addr: u32, pos: u8) -> Side {
        if Cidr::bit_at(addr, pos) == 1 {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Binary prefix tree over IPv4 space with attribute-carrying nodes.
#[derive(Debug, Default)]
pub struct AddressTrie {
    nodes: Vec<Option<AddressNode>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

impl AddressTrie {
    pub fn new() -> Self {
        AddressTrie::default()
    }

    /// Number of live nodes, synthetic branches included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: NodeId) -> &AddressNode {
        self.nodes[id.index()].as_ref().expect("live NodeId")
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut AddressNode {
        self.nodes[id.index()].as_mut().expect("live NodeId")
    }

    /// Record that the labeler consulted or updated this node; the idle
    /// sweep keeps touched nodes alive.
    pub fn touch(&mut self, id: NodeId, now: Instant) {
        self.get_mut(id).last_used = Some(now);
    }

    /// Iterate over all live node ids.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Find a node for `query` under the given match mode. A miss is a
    /// normal outcome (unlabeled address), not an error.
    pub fn find(&self, query: Cidr, mode: MatchMode) -> Option<NodeId> {
        self.root.and_then(|root| self.find_from(root, query, mode))
    }

    fn find_from(&self, id: NodeId, query: Cidr, mode: MatchMode) -> Option<NodeId> {
        let n = self.get(id);
        let mask = n.prefix.mask();

        if (n.prefix.addr & mask) != (query.addr & mask) {
            // In Mask mode a more specific node may still match once its
            // mask is reapplied at the query's granularity.
            if mode == MatchMode::Mask
                && n.prefix.mask_len >= query.mask_len
                && (n.prefix.addr & query.mask()) == (query.addr & query.mask())
            {
                return Some(id);
            }
            return None;
        }

        match mode {
            MatchMode::Any => Some(id),

            MatchMode::Mask => {
                if n.prefix.mask_len >= query.mask_len {
                    Some(id)
                } else {
                    self.descend(id, query, mode)
                }
            }

            MatchMode::Exact => {
                if query.mask_len == n.prefix.mask_len {
                    Some(id)
                } else if n.is_leaf() {
                    None
                } else {
                    self.descend(id, query, mode)
                }
            }

            MatchMode::Super => {
                if n.is_leaf() || query.mask_len == n.prefix.mask_len {
                    Some(id)
                } else {
                    self.descend(id, query, mode)
                }
            }

            MatchMode::Node => {
                if n.is_leaf() {
                    return Some(id);
                }
                match self.descend(id, query, mode) {
                    Some(hit) => Some(hit),
                    // No exact leaf below: an internal node deep enough,
                    // close enough to the query, or already labeled is a
                    // good enough label source.
                    None if n.prefix.mask_len > NODE_MATCH_DEPTH
                        || n.prefix.mask_len + NODE_MATCH_SLACK > query.mask_len
                        || n.label.is_some() =>
                    {
                        Some(id)
                    }
                    None => None,
                }
            }

            MatchMode::Longest => self.descend(id, query, mode).or(Some(id)),
        }
    }

    fn descend(&self, id: NodeId, query: Cidr, mode: MatchMode) -> Option<NodeId> {
        let n = self.get(id);
        let child = match Side::for_bit(query.addr, n.prefix.mask_len) {
            Side::Left => n.left,
            Side::Right => n.right,
        };
        child.and_then(|c| self.find_from(c, query, mode))
    }

    // =========================================================================
    // INSERTION
    // =========================================================================

    /// Insert a configured prefix, splitting and splicing as needed.
    ///
    /// Returns the node actually present afterwards: the new node, or the
    /// pre-existing node when the identical network was already configured
    /// (attributes merge; a conflicting non-empty attribute is an error).
    pub fn insert(
        &mut self,
        cidr: Cidr,
        attrs: NodeAttrs,
        status: NodeStatus,
    ) -> Result<NodeId, TreeError> {
        self.insert_with(cidr, attrs, status | NodeStatus::CONFIGURED)
    }

    /// Insert a transient node for an observed address. Unlike configured
    /// prefixes, dynamic nodes are eligible for the idle sweep.
    pub fn insert_dynamic(&mut self, cidr: Cidr) -> Result<NodeId, TreeError> {
        self.insert_with(cidr, NodeAttrs::default(), NodeStatus::EMPTY)
    }

    fn insert_with(
        &mut self,
        cidr: Cidr,
        attrs: NodeAttrs,
        status: NodeStatus,
    ) -> Result<NodeId, TreeError> {
        // Validate, then drop host bits beyond the mask; compares assume
        // normalized prefixes throughout.
        let cidr = Cidr::new(cidr.addr, cidr.mask_len)?;
        let cidr = Cidr {
            addr: cidr.network(),
            mask_len: cidr.mask_len,
        };
        let node = self.alloc(AddressNode::new(cidr, attrs, status));

        match self.root {
            None => {
                self.root = Some(node);
                debug!(prefix = %cidr, "address tree root created");
                Ok(node)
            }
            Some(root) => self.place(root, node, status),
        }
    }

    /// Recursive descent of the insertion algorithm. `node` is unplaced on
    /// entry; on return it is either linked into the trie or freed (the
    /// duplicate case). `status` seeds synthesized branch nodes.
    fn place(
        &mut self,
        tree: NodeId,
        node: NodeId,
        status: NodeStatus,
    ) -> Result<NodeId, TreeError> {
        let tprefix = self.get(tree).prefix;
        let nprefix = self.get(node).prefix;

        if tprefix == nprefix {
            let merged = self.merge_duplicate(tree, node);
            self.dealloc(node);
            return merged.map(|_| tree);
        }

        let tmask = tprefix.mask();
        if (nprefix.addr & tmask) == (tprefix.addr & tmask) {
            if nprefix.mask_len > tprefix.mask_len {
                self.place_below(tree, node, status)
            } else {
                // Shallower prefix on the same path becomes an ancestor.
                self.splice_above(tree, node);
                Ok(node)
            }
        } else {
            self.fork(tree, node, status)
        }
    }

    /// `node` is strictly more specific than `tree` and inside it: descend
    /// one level, splitting the occupied child slot when necessary.
    fn place_below(
        &mut self,
        tree: NodeId,
        node: NodeId,
        status: NodeStatus,
    ) -> Result<NodeId, TreeError> {
        let tprefix = self.get(tree).prefix;
        let nprefix = self.get(node).prefix;
        let side = Side::for_bit(nprefix.addr, tprefix.mask_len);

        let existing = match side {
            Side::Left => self.get(tree).left,
            Side::Right => self.get(tree).right,
        };

        let Some(existing) = existing else {
            self.attach(tree, side, node);
            return Ok(node);
        };

        let eprefix = self.get(existing).prefix;
        if nprefix.mask_len >= eprefix.mask_len {
            return self.place(existing, node, status);
        }

        // node sits between tree and the occupying child: find the longest
        // common prefix of the two, scanned one bit past the fork point
        // through node's own length.
        let mut common = nprefix.mask_len;
        for i in (tprefix.mask_len + 1)..=nprefix.mask_len {
            if (eprefix.addr & Cidr::mask_for(i)) != (nprefix.addr & Cidr::mask_for(i)) {
                common = i - 1;
                break;
            }
        }

        if common == nprefix.mask_len {
            // node exactly covers the child's position: interpose it and
            // re-rank the child beneath.
            self.attach(tree, side, node);
            self.place(node, existing, status)?;
            Ok(node)
        } else {
            let branch = self.alloc(AddressNode::branch(
                Cidr {
                    addr: nprefix.addr & Cidr::mask_for(common),
                    mask_len: common,
                },
                status,
            ));
            debug!(prefix = %self.get(branch).prefix, "synthesized branch node");
            self.attach(tree, side, branch);
            self.place(branch, existing, status)?;
            self.place(branch, node, status)
        }
    }

    /// `node` and `tree` diverge under `tree`'s mask: synthesize a branch
    /// at their common prefix length (or use `node` itself when the fork
    /// point is exactly `node`'s prefix) and splice it into `tree`'s place.
    fn fork(&mut self, tree: NodeId, node: NodeId, status: NodeStatus) -> Result<NodeId, TreeError> {
        let tprefix = self.get(tree).prefix;
        let nprefix = self.get(node).prefix;
        let offset = self.get(tree).offset;

        // Count agreeing bits starting at the nearest ancestor branch
        // point; divergence is guaranteed before tree's mask ends.
        let agree = !(tprefix.addr ^ nprefix.addr) & tprefix.mask();
        let shifted = if offset >= 32 { 0 } else { agree << offset };
        let span = nprefix.mask_len.saturating_sub(offset);
        let common_bits = (shifted.leading_ones() as u8).min(span);
        let fork_len = offset + common_bits;

        let fork_prefix = Cidr {
            addr: nprefix.addr & Cidr::mask_for(fork_len),
            mask_len: fork_len,
        };

        if fork_prefix == nprefix {
            // The fork point is the new node itself.
            self.splice_above(tree, node);
            return Ok(node);
        }

        let branch = self.alloc(AddressNode::branch(fork_prefix, status));
        self.get_mut(branch).record = self.get(tree).record.clone();
        debug!(prefix = %fork_prefix, "forked at common prefix");

        self.replace_in_parent(tree, branch);
        let side = Side::for_bit(tprefix.addr, fork_len);
        self.attach(branch, side, tree);
        self.attach(branch, side.other(), node);
        Ok(node)
    }

    /// Fill unset attributes of `tree` from the duplicate `node`; a
    /// conflicting non-empty attribute is rejected.
    fn merge_duplicate(&mut self, tree: NodeId, node: NodeId) -> Result<(), TreeError> {
        let incoming = self.get(node).clone();
        let prefix = incoming.prefix.to_string();
        let existing = self.get_mut(tree);
        existing.status.insert(incoming.status);

        fn fill<T: PartialEq + Clone + std::fmt::Debug>(
            slot: &mut Option<T>,
            incoming: Option<T>,
            field: &'static str,
            prefix: &str,
        ) -> Result<(), TreeError> {
            match (&slot, incoming) {
                (_, None) => Ok(()),
                (None, Some(v)) => {
                    *slot = Some(v);
                    Ok(())
                }
                (Some(cur), Some(v)) if *cur == v => Ok(()),
                (Some(cur), Some(v)) => Err(TreeError::ConflictingAttribute {
                    prefix: prefix.to_string(),
                    field,
                    existing: format!("{cur:?}"),
                    incoming: format!("{v:?}"),
                }),
            }
        }

        fill(&mut existing.label, incoming.label.clone(), "label", &prefix)?;
        fill(&mut existing.group, incoming.group.clone(), "group", &prefix)?;

        if incoming.country[0] != 0 {
            if existing.country[0] == 0 {
                existing.country = incoming.country;
            } else if existing.country != incoming.country {
                return Err(TreeError::ConflictingAttribute {
                    prefix,
                    field: "country",
                    existing: format!("{:?}", existing.country_str()),
                    incoming: format!("{:?}", incoming.country_str()),
                });
            }
        }
        if incoming.locality != 0 && existing.locality == 0 {
            existing.locality = incoming.locality;
        }
        if incoming.asn != 0 && existing.asn == 0 {
            existing.asn = incoming.asn;
        }
        Ok(())
    }

    // =========================================================================
    // LINKING PRIMITIVES
    // =========================================================================

    /// Link `child` under `parent` on `side`, maintaining the offset
    /// invariant.
    fn attach(&mut self, parent: NodeId, side: Side, child: NodeId) {
        let pprefix = self.get(parent).prefix;
        let cprefix = self.get(child).prefix;
        debug_assert!(
            cprefix.mask_len > pprefix.mask_len,
            "branch invariant: {cprefix} under {pprefix}"
        );
        debug_assert_eq!(
            cprefix.addr & pprefix.mask(),
            pprefix.network(),
            "branch invariant: {cprefix} disagrees with {pprefix}"
        );

        match side {
            Side::Left => self.get_mut(parent).left = Some(child),
            Side::Right => self.get_mut(parent).right = Some(child),
        }
        let c = self.get_mut(child);
        c.parent = Some(parent);
        c.offset = pprefix.mask_len;
    }

    /// Replace `old` with `new` in `old`'s parent slot (or at the root).
    fn replace_in_parent(&mut self, old: NodeId, new: NodeId) {
        match self.get(old).parent {
            Some(p) => {
                let side = if self.get(p).left == Some(old) {
                    Side::Left
                } else {
                    Side::Right
                };
                match side {
                    Side::Left => self.get_mut(p).left = Some(new),
                    Side::Right => self.get_mut(p).right = Some(new),
                }
                let plen = self.get(p).prefix.mask_len;
                let n = self.get_mut(new);
                n.parent = Some(p);
                n.offset = plen;
            }
            None => {
                self.root = Some(new);
                let n = self.get_mut(new);
                n.parent = None;
                n.offset = 0;
            }
        }
    }

    /// Interpose `node` between `tree` and `tree`'s parent.
    fn splice_above(&mut self, tree: NodeId, node: NodeId) {
        let tprefix = self.get(tree).prefix;
        let nprefix = self.get(node).prefix;
        let side = Side::for_bit(tprefix.addr, nprefix.mask_len);
        self.replace_in_parent(tree, node);
        self.attach(node, side, tree);
    }

    // =========================================================================
    // REMOVAL
    // =========================================================================

    /// Unlink `id` from its parent and free the whole subtree; returns the
    /// number of nodes removed.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> usize {
        match self.get(id).parent {
            Some(p) => {
                if self.get(p).left == Some(id) {
                    self.get_mut(p).left = None;
                } else if self.get(p).right == Some(id) {
                    self.get_mut(p).right = None;
                }
            }
            None => self.root = None,
        }
        self.dealloc_subtree(id)
    }

    fn dealloc_subtree(&mut self, id: NodeId) -> usize {
        let (l, r) = {
            let n = self.get(id);
            (n.left, n.right)
        };
        let mut removed = 1;
        if let Some(c) = l {
            removed += self.dealloc_subtree(c);
        }
        if let Some(c) = r {
            removed += self.dealloc_subtree(c);
        }
        self.dealloc(id);
        removed
    }

    // =========================================================================
    // IDLE SWEEP
    // =========================================================================

    /// Delete non-configured leaves that have been idle for at least
    /// `idle`, collapsing synthetic branches left childless. Configured
    /// nodes are never timed out. Returns the number of nodes removed.
    pub fn timeout_sweep(&mut self, idle: Duration, now: Instant) -> usize {
        let Some(root) = self.root else { return 0 };
        let mut removed = 0;
        if self.sweep(root, idle, now, &mut removed) {
            removed += self.remove_subtree(root);
        }
        if removed > 0 {
            debug!(removed, "idle sweep removed stale nodes");
        }
        removed
    }

    /// Post-order sweep; returns true when `id` itself should be removed.
    fn sweep(&mut self, id: NodeId, idle: Duration, now: Instant, removed: &mut usize) -> bool {
        let (l, r) = {
            let n = self.get(id);
            (n.left, n.right)
        };
        for child in [l, r].into_iter().flatten() {
            if self.sweep(child, idle, now, removed) {
                *removed += self.remove_subtree(child);
            }
        }

        let n = self.get(id);
        if !n.is_leaf() || n.is_configured() {
            return false;
        }
        match n.last_used {
            Some(t) => now.saturating_duration_since(t) >= idle,
            None => true,
        }
    }

    // =========================================================================
    // ARENA
    // =========================================================================

    fn alloc(&mut self, node: AddressNode) -> NodeId {
        self.len += 1;
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn dealloc(&mut self, id: NodeId) {
        debug_assert!(self.nodes[id.index()].is_some(), "double free of NodeId");
        self.nodes[id.index()] = None;
        self.free.push(id);
        self.len -= 1;
    }
}
