//! RIR delegation file reader.
//!
//! Delegation files are pipe-separated:
//!
//! ```text
//! registry|cc|ipv4|start-address|count|date|status
//! ```
//!
//! Version headers, summary rows, non-IPv4 rows, and `*` country codes
//! are skipped. Each `(start, count)` extent expands to aligned CIDR
//! blocks carrying the country code; a block already present keeps its
//! existing attributes, and a conflicting country is reported and
//! skipped rather than overwritten.

use std::net::Ipv4Addr;

use fl_01_address_tree::{NodeAttrs, TreeError};
use shared_types::cidr_span;
use tracing::warn;

use crate::error::LabelError;
use crate::ports::outbound::GeoLookup;
use crate::service::Labeler;

/// Load delegation text; returns the number of CIDR blocks applied.
pub fn load_rir<G: GeoLookup>(labeler: &Labeler<G>, text: &str) -> Result<usize, LabelError> {
    let mut applied = 0;
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 5 {
            continue;
        }
        let (cc, kind, start, count) = (fields[1], fields[2], fields[3], fields[4]);
        if kind != "ipv4" || cc == "*" || start == "*" {
            continue;
        }
        let Ok(start) = start.parse::<Ipv4Addr>() else {
            // Version headers carry a number here.
            continue;
        };
        let Ok(count) = count.parse::<u64>() else {
            continue;
        };

        for cidr in cidr_span(u32::from(start), count) {
            match labeler.insert_attrs(cidr, NodeAttrs::with_country(cc)) {
                Ok(()) => applied += 1,
                Err(LabelError::Tree(TreeError::ConflictingAttribute { prefix, .. })) => {
                    warn!(%prefix, cc, "conflicting delegation entry skipped");
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(applied)
}
