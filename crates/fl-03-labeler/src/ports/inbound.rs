//! Driving port: the API the labeler exposes to flow-processing tooling.

use std::time::{Duration, Instant};

use fl_01_address_tree::{MatchMode, PruneOptions};
use shared_types::{Cidr, FlowRecord, Protocol, ServiceName};

use crate::domain::MergePolicy;
use crate::error::LabelError;

/// Snapshot of a trie node's classification attributes, detached from the
/// tree so callers never hold a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub prefix: Cidr,
    pub label: Option<String>,
    pub locality: i32,
    pub asn: u32,
    pub country: Option<String>,
    pub group: Option<String>,
}

pub trait LabelerApi {
    /// Insert a configured CIDR with classification attributes.
    fn insert_address(
        &self,
        cidr: Cidr,
        label: Option<String>,
        locality: Option<i32>,
        asn: Option<u32>,
        country: Option<[u8; 4]>,
    ) -> Result<(), LabelError>;

    /// Look an address or prefix up under the given match mode.
    fn find_address(&self, query: Cidr, mode: MatchMode) -> Option<AddressInfo>;

    /// Collapse the address tree; returns nodes removed.
    fn prune(&self, opts: &PruneOptions) -> usize;

    /// Expire idle dynamic nodes; returns nodes removed.
    fn timeout_sweep(&self, idle: Duration, now: Instant) -> usize;

    /// Parse and register one signature line.
    fn load_signature(&self, text: &str) -> Result<(), LabelError>;

    /// Resolve a service name from payload samples and ports.
    fn classify_service(
        &self,
        proto: Protocol,
        sport: u16,
        dport: u16,
        src_sample: Option<&[u8]>,
        dst_sample: Option<&[u8]>,
    ) -> Option<ServiceName>;

    /// Merge two label strings under a policy.
    fn merge_label(&self, existing: &str, incoming: &str, policy: MergePolicy) -> String;

    /// Produce the full enrichment label for one flow.
    fn label_flow(&self, record: &FlowRecord) -> Option<String>;
}
