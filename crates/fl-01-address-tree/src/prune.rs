//! Aggregation pruning: collapse subtrees whose nodes all carry the same
//! classification attribute into their nearest common ancestor.
//!
//! Pruning runs after bulk configuration import (RIR tables in particular
//! produce long runs of adjacent prefixes with identical attributes) and
//! periodically against trees grown from observed traffic.

use tracing::debug;

use crate::node::AddressNode;
use crate::trie::{AddressTrie, NodeId};

/// How much of a DNS-style label participates in the equality test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScope {
    /// The whole label string.
    Full,
    /// Only the final dot-separated component ("com").
    TldSuffix,
    /// The final two components ("example.com").
    SldSuffix,
}

/// Which attribute drives the collapse decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneMode {
    Label(LabelScope),
    Group,
    CountryCode,
    Asn,
    Locality,
    /// Drop nodes carrying no flow record anywhere beneath them.
    Record,
}

/// Pruning parameters.
#[derive(Debug, Clone, Copy)]
pub struct PruneOptions {
    pub mode: PruneMode,
    /// Mask-length floor: never collapse into a node coarser than this.
    pub level: u8,
    /// Only delete children exactly one bit deeper than the survivor.
    pub adjacent_only: bool,
}

impl PruneOptions {
    pub fn new(mode: PruneMode) -> Self {
        PruneOptions {
            mode,
            level: 0,
            adjacent_only: false,
        }
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn adjacent_only(mut self) -> Self {
        self.adjacent_only = true;
        self
    }
}

/// Attribute value under comparison. Empty strings and zero numerics are
/// "unset" and never participate in a collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrValue {
    Text(String),
    Num(i64),
}

fn label_view(label: &str, scope: LabelScope) -> &str {
    match scope {
        LabelScope::Full => label,
        LabelScope::TldSuffix => label.rsplit('.').next().unwrap_or(label),
        LabelScope::SldSuffix => {
            let mut dots = label.rmatch_indices('.').map(|(i, _)| i);
            dots.next();
            match dots.next() {
                Some(i) => &label[i + 1..],
                None => label,
            }
        }
    }
}

fn attr_value(node: &AddressNode, mode: PruneMode) -> Option<AttrValue> {
    match mode {
        PruneMode::Label(scope) => node
            .label
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| AttrValue::Text(label_view(s, scope).to_string())),
        PruneMode::Group => node
            .group
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| AttrValue::Text(s.to_string())),
        PruneMode::CountryCode => node.country_str().map(|s| AttrValue::Text(s.to_string())),
        PruneMode::Asn => (node.asn != 0).then(|| AttrValue::Num(node.asn as i64)),
        PruneMode::Locality => (node.locality != 0).then(|| AttrValue::Num(node.locality as i64)),
        PruneMode::Record => None,
    }
}

/// Store a lifted value back into the surviving ancestor.
fn store_value(node: &mut AddressNode, value: &AttrValue, mode: PruneMode) {
    match (mode, value) {
        (PruneMode::Label(_), AttrValue::Text(s)) => {
            if node.label.is_none() {
                node.label = Some(s.clone());
            }
        }
        (PruneMode::Group, AttrValue::Text(s)) => {
            if node.group.is_none() {
                node.group = Some(s.clone());
            }
        }
        (PruneMode::CountryCode, AttrValue::Text(s)) => {
            if node.country[0] == 0 {
                let mut country = [0u8; 4];
                for (dst, src) in country.iter_mut().zip(s.bytes()) {
                    *dst = src;
                }
                node.country = country;
            }
        }
        (PruneMode::Asn, AttrValue::Num(n)) => {
            if node.asn == 0 {
                node.asn = *n as u32;
            }
        }
        (PruneMode::Locality, AttrValue::Num(n)) => {
            if node.locality == 0 {
                node.locality = *n as i32;
            }
        }
        _ => {}
    }
}

impl AddressTrie {
    /// Collapse the trie according to `opts`; returns the number of nodes
    /// removed.
    pub fn prune(&mut self, opts: &PruneOptions) -> usize {
        let Some(root) = self.root() else { return 0 };
        let mut removed = 0;
        match opts.mode {
            PruneMode::Record => {
                if !self.prune_records(root, &mut removed) {
                    removed += self.remove_subtree(root);
                }
            }
            _ => {
                self.prune_value(root, opts, &mut removed);
            }
        }
        if removed > 0 {
            debug!(removed, mode = ?opts.mode, "pruned address tree");
        }
        removed
    }

    /// Post-order collapse for the attribute-driven modes. Returns the
    /// uniform attribute value of the whole subtree, or `None` when the
    /// subtree mixes values (or has none).
    fn prune_value(
        &mut self,
        id: NodeId,
        opts: &PruneOptions,
        removed: &mut usize,
    ) -> Option<AttrValue> {
        let (l, r) = {
            let n = self.get(id);
            (n.left, n.right)
        };
        let lv = l.and_then(|c| self.prune_value(c, opts, removed));
        let rv = r.and_then(|c| self.prune_value(c, opts, removed));

        let own = attr_value(self.get(id), opts.mode);
        let deep_enough = self.get(id).prefix.mask_len >= opts.level;

        let step_ok = |trie: &AddressTrie, child: NodeId| {
            !opts.adjacent_only
                || trie.get(child).prefix.mask_len == trie.get(id).prefix.mask_len + 1
        };

        // A labeled ancestor absorbs any child subtree with the same
        // uniform value.
        if let Some(o) = &own {
            if deep_enough {
                if let (Some(c), Some(v)) = (l, &lv) {
                    if v == o && step_ok(self, c) {
                        *removed += self.remove_subtree(c);
                    }
                }
                if let (Some(c), Some(v)) = (r, &rv) {
                    if v == o && step_ok(self, c) {
                        *removed += self.remove_subtree(c);
                    }
                }
            }
        } else if let (Some(lc), Some(rc), Some(a), Some(b)) = (l, r, &lv, &rv) {
            // Both branches uniformly agree: lift the value and collapse.
            if a == b && deep_enough && step_ok(self, lc) && step_ok(self, rc) {
                let value = a.clone();
                *removed += self.remove_subtree(lc);
                *removed += self.remove_subtree(rc);
                store_value(self.get_mut(id), &value, opts.mode);
            }
        }

        // Report the subtree's uniform value upward, independent of
        // whether local deletion was allowed.
        let n = self.get(id);
        let subtree = match (n.left.is_some(), n.right.is_some()) {
            (false, false) => own.clone().or_else(|| lv.or(rv)),
            _ => {
                let mut vals = Vec::new();
                if n.left.is_some() {
                    match &lv {
                        Some(v) => vals.push(v.clone()),
                        None => return None,
                    }
                }
                if n.right.is_some() {
                    match &rv {
                        Some(v) => vals.push(v.clone()),
                        None => return None,
                    }
                }
                if let Some(o) = &own {
                    vals.push(o.clone());
                }
                let first = vals.first().cloned();
                if vals.iter().all(|v| Some(v) == first.as_ref()) {
                    first
                } else {
                    None
                }
            }
        };
        subtree
    }

    /// Keep only nodes with a flow record somewhere beneath them. Returns
    /// true when `id`'s subtree survives.
    fn prune_records(&mut self, id: NodeId, removed: &mut usize) -> bool {
        let (l, r) = {
            let n = self.get(id);
            (n.left, n.right)
        };
        for child in [l, r].into_iter().flatten() {
            if !self.prune_records(child, removed) {
                *removed += self.remove_subtree(child);
            }
        }
        let n = self.get(id);
        n.record.is_some() || !n.is_leaf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeAttrs, NodeStatus};
    use crate::trie::MatchMode;
    use shared_types::{Cidr, FlowRecord};

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    fn insert(trie: &mut AddressTrie, s: &str, attrs: NodeAttrs) -> NodeId {
        trie.insert(cidr(s), attrs, NodeStatus::VISITED).unwrap()
    }

    #[test]
    fn test_label_view_scopes() {
        assert_eq!(label_view("www.example.com", LabelScope::Full), "www.example.com");
        assert_eq!(label_view("www.example.com", LabelScope::TldSuffix), "com");
        assert_eq!(label_view("www.example.com", LabelScope::SldSuffix), "example.com");
        assert_eq!(label_view("plain", LabelScope::SldSuffix), "plain");
    }

    #[test]
    fn test_redundant_child_absorbed_by_labeled_ancestor() {
        let mut trie = AddressTrie::new();
        insert(&mut trie, "192.168.0.0/16", NodeAttrs::with_label("corp"));
        insert(&mut trie, "192.168.1.0/24", NodeAttrs::with_label("corp"));

        let removed = trie.prune(&PruneOptions::new(PruneMode::Label(LabelScope::Full)));
        assert_eq!(removed, 1);

        assert!(trie.find(cidr("192.168.1.0/24"), MatchMode::Exact).is_none());
        let hit = trie.find(cidr("192.168.1.1"), MatchMode::Longest).unwrap();
        assert_eq!(trie.get(hit).label.as_deref(), Some("corp"));
        assert_eq!(trie.get(hit).prefix, cidr("192.168.0.0/16"));
    }

    #[test]
    fn test_sibling_agreement_lifts_value_into_branch() {
        let mut trie = AddressTrie::new();
        insert(&mut trie, "10.0.0.0/8", NodeAttrs::default());
        insert(&mut trie, "10.0.0.0/16", NodeAttrs::with_country("US"));
        insert(&mut trie, "10.1.0.0/16", NodeAttrs::with_country("US"));

        let removed = trie.prune(&PruneOptions::new(PruneMode::CountryCode));
        assert!(removed >= 2);

        // The covering branch now answers with the lifted country.
        let hit = trie.find(cidr("10.0.5.5"), MatchMode::Longest).unwrap();
        assert_eq!(trie.get(hit).country_str(), Some("US"));
        assert!(trie.find(cidr("10.0.0.0/16"), MatchMode::Exact).is_none());
    }

    #[test]
    fn test_disagreeing_siblings_are_kept() {
        let mut trie = AddressTrie::new();
        insert(&mut trie, "10.0.0.0/16", NodeAttrs::with_label("a"));
        insert(&mut trie, "10.1.0.0/16", NodeAttrs::with_label("b"));

        let removed = trie.prune(&PruneOptions::new(PruneMode::Label(LabelScope::Full)));
        assert_eq!(removed, 0);
        assert!(trie.find(cidr("10.0.0.0/16"), MatchMode::Exact).is_some());
        assert!(trie.find(cidr("10.1.0.0/16"), MatchMode::Exact).is_some());
    }

    #[test]
    fn test_level_floor_blocks_coarse_collapse() {
        let mut trie = AddressTrie::new();
        insert(&mut trie, "192.168.0.0/16", NodeAttrs::with_label("corp"));
        insert(&mut trie, "192.168.1.0/24", NodeAttrs::with_label("corp"));

        // Floor at /20: the /16 survivor is too coarse to absorb.
        let removed = trie.prune(
            &PruneOptions::new(PruneMode::Label(LabelScope::Full)).level(20),
        );
        assert_eq!(removed, 0);
        assert!(trie.find(cidr("192.168.1.0/24"), MatchMode::Exact).is_some());
    }

    #[test]
    fn test_adjacent_only_requires_one_bit_step() {
        let mut trie = AddressTrie::new();
        insert(&mut trie, "192.168.0.0/16", NodeAttrs::with_label("corp"));
        insert(&mut trie, "192.168.1.0/24", NodeAttrs::with_label("corp"));

        // /24 is eight bits below /16, so adjacency fails.
        let removed = trie.prune(
            &PruneOptions::new(PruneMode::Label(LabelScope::Full)).adjacent_only(),
        );
        assert_eq!(removed, 0);

        insert(&mut trie, "192.168.128.0/17", NodeAttrs::with_label("corp"));
        let removed = trie.prune(
            &PruneOptions::new(PruneMode::Label(LabelScope::Full)).adjacent_only(),
        );
        assert_eq!(removed, 1);
        assert!(trie.find(cidr("192.168.128.0/17"), MatchMode::Exact).is_none());
    }

    #[test]
    fn test_tld_scope_collapses_across_differing_hosts() {
        let mut trie = AddressTrie::new();
        insert(&mut trie, "10.0.0.0/16", NodeAttrs::with_label("a.example.com"));
        insert(&mut trie, "10.1.0.0/16", NodeAttrs::with_label("b.example.com"));

        assert_eq!(
            trie.prune(&PruneOptions::new(PruneMode::Label(LabelScope::Full))),
            0
        );
        let removed = trie.prune(&PruneOptions::new(PruneMode::Label(LabelScope::SldSuffix)));
        assert!(removed >= 2);
        let root = trie.root().unwrap();
        assert_eq!(trie.get(root).label.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_record_prune_drops_recordless_leaves() {
        let mut trie = AddressTrie::new();
        let kept = insert(&mut trie, "10.0.0.0/16", NodeAttrs::default());
        insert(&mut trie, "10.1.0.0/16", NodeAttrs::default());
        trie.get_mut(kept).record = Some(FlowRecord::default());

        let removed = trie.prune(&PruneOptions::new(PruneMode::Record));
        assert!(removed >= 1);
        assert!(trie.find(cidr("10.0.0.0/16"), MatchMode::Exact).is_some());
        assert!(trie.find(cidr("10.1.0.0/16"), MatchMode::Exact).is_none());
    }
}
