//! Locality and ASN propagation.
//!
//! Locality is an ordinal trust level (higher is closer to home). When a
//! node is designated as an interface or local network, its locality and
//! ASN flow upward to the nearest ancestor that already has values, and
//! downward over the whole subtree.

use tracing::trace;

use crate::trie::{AddressTrie, NodeId};

impl AddressTrie {
    /// Push `id`'s locality and ASN up toward the nearest ancestor that
    /// already carries a value of its own; every ancestor strictly between
    /// them adopts `id`'s value.
    pub fn propagate_up(&mut self, id: NodeId) {
        let locality = self.get(id).locality;
        if locality != 0 {
            self.propagate_up_by(id, |n| n.locality != 0, move |n| n.locality = locality);
        }
        let asn = self.get(id).asn;
        if asn != 0 {
            self.propagate_up_by(id, |n| n.asn != 0, move |n| n.asn = asn);
        }
        trace!(prefix = %self.get(id).prefix, locality, "propagated attributes upward");
    }

    fn propagate_up_by(
        &mut self,
        id: NodeId,
        has_value: impl Fn(&crate::node::AddressNode) -> bool,
        set_value: impl Fn(&mut crate::node::AddressNode),
    ) {
        // Find the first ancestor with its own value; it bounds the walk.
        let mut bound = None;
        let mut cur = self.get(id).parent;
        while let Some(p) = cur {
            if has_value(self.get(p)) {
                bound = Some(p);
                break;
            }
            cur = self.get(p).parent;
        }

        let mut cur = self.get(id).parent;
        while let Some(p) = cur {
            if Some(p) == bound {
                break;
            }
            set_value(self.get_mut(p));
            cur = self.get(p).parent;
        }
    }

    /// Spread `id`'s locality and ASN over its subtree: descendants with a
    /// weaker locality are raised to `id`'s, and descendants without an
    /// ASN inherit it.
    pub fn propagate_down(&mut self, id: NodeId) {
        let (locality, asn) = {
            let n = self.get(id);
            (n.locality, n.asn)
        };
        let (l, r) = {
            let n = self.get(id);
            (n.left, n.right)
        };
        for child in [l, r].into_iter().flatten() {
            let c = self.get_mut(child);
            if c.locality < locality {
                c.locality = locality;
            }
            if c.asn == 0 && asn != 0 {
                c.asn = asn;
            }
            self.propagate_down(child);
        }
    }
}
