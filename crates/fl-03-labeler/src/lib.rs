//! # FL-03 Labeler
//!
//! Flow enrichment orchestration: merges address-tree, signature, port
//! table, and geo-provider verdicts into one label per flow.
//!
//! ## Architecture
//!
//! Hexagonal layout:
//!
//! - `domain`: label merge algebra and the static port-label table
//! - `ports`: the inbound [`LabelerApi`] and the outbound [`GeoLookup`]
//!   provider trait
//! - `service`: [`Labeler`], which owns the address trie, the signature
//!   validator, the port table, and the IPv6 opaque map behind locks
//! - `adapters`: configuration-file readers (address/locality config, RIR
//!   delegations, signatures, port tables)
//!
//! Flow of a record: address tree lookups for both endpoints, then
//! service classification with the port table as a last resort, then
//! label assembly (`saddr=<label>:daddr=<label>:srv=<name>`).

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{merge_label, MergePolicy, PortTable};
pub use error::LabelError;
pub use ports::{AddressInfo, GeoLookup, LabelerApi, NoGeo};
pub use service::Labeler;
