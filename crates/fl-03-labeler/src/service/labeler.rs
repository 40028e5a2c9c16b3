//! The labeler service: owns both classification trees and assembles the
//! enrichment label per flow.
//!
//! All structural mutation of the address tree goes through one exclusive
//! lock; lookups share a read lock. The signature forest only mutates
//! during bulk load, but sits behind the same locking discipline so the
//! load phase needs no special casing.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use fl_01_address_tree::{AddressTrie, MatchMode, NodeAttrs, NodeStatus, PruneOptions};
use fl_02_service_detection::{parse_signature, ServiceForest, ServiceValidator};
use shared_types::{Cidr, FlowRecord, Protocol, ServiceName};
use tracing::debug;

use crate::domain::{merge_label, MergePolicy, PortTable};
use crate::error::LabelError;
use crate::ports::inbound::{AddressInfo, LabelerApi};
use crate::ports::outbound::{GeoLookup, NoGeo};

pub struct Labeler<G: GeoLookup = NoGeo> {
    trie: RwLock<AddressTrie>,
    validator: RwLock<ServiceValidator>,
    ports: RwLock<PortTable>,
    /// IPv6 endpoints are tracked as opaque addresses, not a trie.
    v6: RwLock<HashMap<Ipv6Addr, String>>,
    geo: G,
}

impl Default for Labeler<NoGeo> {
    fn default() -> Self {
        Labeler::new(NoGeo)
    }
}

impl<G: GeoLookup> Labeler<G> {
    pub fn new(geo: G) -> Self {
        Labeler {
            trie: RwLock::new(AddressTrie::new()),
            validator: RwLock::new(ServiceValidator::new(ServiceForest::new())),
            ports: RwLock::new(PortTable::new()),
            v6: RwLock::new(HashMap::new()),
            geo,
        }
    }

    fn trie_read(&self) -> RwLockReadGuard<'_, AddressTrie> {
        self.trie.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn trie_write(&self) -> RwLockWriteGuard<'_, AddressTrie> {
        self.trie.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a configured prefix and run locality/ASN propagation when
    /// the entry asserts either.
    pub fn insert_attrs(&self, cidr: Cidr, attrs: NodeAttrs) -> Result<(), LabelError> {
        let propagate = attrs.locality != 0 || attrs.asn != 0;
        let mut trie = self.trie_write();
        let id = trie.insert(cidr, attrs, NodeStatus::VISITED)?;
        if propagate {
            trie.propagate_up(id);
            trie.propagate_down(id);
        }
        Ok(())
    }

    /// Declare a local interface address: locality and ASN flow through
    /// the surrounding tree.
    pub fn mark_interface(&self, addr: Ipv4Addr, locality: i32, asn: u32) -> Result<(), LabelError> {
        debug!(%addr, locality, asn, "marking interface address");
        self.insert_attrs(
            Cidr::host(addr),
            NodeAttrs {
                locality,
                asn,
                ..NodeAttrs::default()
            },
        )
    }

    /// Record an observed flow: transient host nodes get the record
    /// attached and their idle clocks reset.
    pub fn observe(&self, record: &FlowRecord, now: Instant) -> Result<(), LabelError> {
        let mut trie = self.trie_write();
        for addr in [record.saddr, record.daddr].into_iter().flatten() {
            let id = trie.insert_dynamic(Cidr::host(addr))?;
            let node = trie.get_mut(id);
            node.record = Some(record.clone());
            node.last_used = Some(now);
        }
        Ok(())
    }

    pub fn add_port(&self, proto: Protocol, start: u16, end: u16, label: impl Into<String>) {
        self.ports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(proto, start, end, label);
    }

    pub fn add_port_line(&self, line_no: usize, line: &str) -> Result<(), LabelError> {
        self.ports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_line(line_no, line)
    }

    /// Attach an opaque label to an IPv6 endpoint.
    pub fn insert_v6(&self, addr: Ipv6Addr, label: impl Into<String>) {
        self.v6
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, label.into());
    }

    pub fn find_v6(&self, addr: &Ipv6Addr) -> Option<String> {
        self.v6
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(addr)
            .cloned()
    }

    /// The label for one endpoint address: trie label, country code, and
    /// geo provider text merged together.
    fn address_label(&self, addr: Ipv4Addr) -> Option<String> {
        let from_tree = {
            let trie = self.trie_read();
            trie.find(Cidr::host(addr), MatchMode::Node).and_then(|id| {
                let n = trie.get(id);
                let mut label = n.label.clone();
                if let Some(cc) = n.country_str() {
                    let cco = format!("cco={cc}");
                    label = Some(match label {
                        Some(l) => merge_label(&l, &cco, MergePolicy::Union),
                        None => cco,
                    });
                }
                label
            })
        };
        match (from_tree, self.geo.lookup(addr)) {
            (Some(a), Some(b)) => Some(merge_label(&a, &b, MergePolicy::Union)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    fn service_label(&self, record: &FlowRecord) -> Option<String> {
        let proto = record.proto?;
        let classified = self.classify_service(
            proto,
            record.sport,
            record.dport,
            record.src_payload.as_deref(),
            record.dst_payload.as_deref(),
        );
        classified.or_else(|| {
            let ports = self.ports.read().unwrap_or_else(PoisonError::into_inner);
            ports
                .lookup(proto, record.dport)
                .or_else(|| ports.lookup(proto, record.sport))
                .map(String::from)
        })
    }
}

impl<G: GeoLookup> LabelerApi for Labeler<G> {
    fn insert_address(
        &self,
        cidr: Cidr,
        label: Option<String>,
        locality: Option<i32>,
        asn: Option<u32>,
        country: Option<[u8; 4]>,
    ) -> Result<(), LabelError> {
        self.insert_attrs(
            cidr,
            NodeAttrs {
                label,
                locality: locality.unwrap_or(0),
                asn: asn.unwrap_or(0),
                country: country.unwrap_or([0; 4]),
                group: None,
            },
        )
    }

    fn find_address(&self, query: Cidr, mode: MatchMode) -> Option<AddressInfo> {
        let trie = self.trie_read();
        trie.find(query, mode).map(|id| {
            let n = trie.get(id);
            AddressInfo {
                prefix: n.prefix,
                label: n.label.clone(),
                locality: n.locality,
                asn: n.asn,
                country: n.country_str().map(String::from),
                group: n.group.clone(),
            }
        })
    }

    fn prune(&self, opts: &PruneOptions) -> usize {
        self.trie_write().prune(opts)
    }

    fn timeout_sweep(&self, idle: Duration, now: Instant) -> usize {
        self.trie_write().timeout_sweep(idle, now)
    }

    fn load_signature(&self, text: &str) -> Result<(), LabelError> {
        let sig = parse_signature(text)?;
        self.validator
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .forest_mut()
            .insert(sig);
        Ok(())
    }

    fn classify_service(
        &self,
        proto: Protocol,
        sport: u16,
        dport: u16,
        src_sample: Option<&[u8]>,
        dst_sample: Option<&[u8]>,
    ) -> Option<ServiceName> {
        self.validator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .classify(proto, sport, dport, src_sample, dst_sample)
            .map(|sig| sig.name.clone())
    }

    fn merge_label(&self, existing: &str, incoming: &str, policy: MergePolicy) -> String {
        merge_label(existing, incoming, policy)
    }

    fn label_flow(&self, record: &FlowRecord) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(l) = record.saddr.and_then(|a| self.address_label(a)) {
            parts.push(format!("saddr={l}"));
        }
        if let Some(l) = record.daddr.and_then(|a| self.address_label(a)) {
            parts.push(format!("daddr={l}"));
        }
        if let Some(srv) = self.service_label(record) {
            parts.push(format!("srv={srv}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(":"))
        }
    }
}
