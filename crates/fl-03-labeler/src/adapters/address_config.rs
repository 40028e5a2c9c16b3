//! Address/locality configuration reader.
//!
//! Line grammar:
//!
//! ```text
//! <cidr>[-<end-address>] [label words] [locality=<n>] [asn=<n>] [group=<g>]
//! ```
//!
//! `#` starts a comment. An address range expands to the minimal list of
//! aligned CIDR blocks covering it; every block receives the same
//! attributes.

use std::net::Ipv4Addr;

use fl_01_address_tree::NodeAttrs;
use shared_types::{cidr_span, Cidr, PrefixError};

use crate::error::LabelError;
use crate::ports::outbound::GeoLookup;
use crate::service::Labeler;

/// Load configuration text; returns the number of entries applied.
pub fn load_address_config<G: GeoLookup>(
    labeler: &Labeler<G>,
    text: &str,
) -> Result<usize, LabelError> {
    let mut applied = 0;
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('#').next().unwrap_or(raw).trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let addr_spec = tokens
            .next()
            .ok_or_else(|| LabelError::parse(line_no, "missing address"))?;
        let cidrs = parse_addr_spec(line_no, addr_spec)?;

        let mut attrs = NodeAttrs::default();
        let mut label_words: Vec<&str> = Vec::new();
        for token in tokens {
            match token.split_once('=') {
                Some(("locality", v)) => {
                    attrs.locality = v
                        .parse()
                        .map_err(|_| LabelError::parse(line_no, "bad locality"))?;
                }
                Some(("asn", v)) => {
                    attrs.asn = v
                        .parse()
                        .map_err(|_| LabelError::parse(line_no, "bad asn"))?;
                }
                Some(("group", v)) => attrs.group = Some(v.to_string()),
                _ => label_words.push(token),
            }
        }
        if !label_words.is_empty() {
            attrs.label = Some(label_words.join(" "));
        }

        for cidr in cidrs {
            labeler.insert_attrs(cidr, attrs.clone())?;
            applied += 1;
        }
    }
    Ok(applied)
}

/// A single CIDR, or a `start-end` address range expanded to CIDR blocks.
fn parse_addr_spec(line_no: usize, spec: &str) -> Result<Vec<Cidr>, LabelError> {
    // A '/' marks a plain CIDR; otherwise a '-' splits a range.
    if !spec.contains('/') {
        if let Some((a, b)) = spec.split_once('-') {
            let start: Ipv4Addr = a
                .parse()
                .map_err(|_| LabelError::parse(line_no, "bad range start"))?;
            let end: Ipv4Addr = b
                .parse()
                .map_err(|_| LabelError::parse(line_no, "bad range end"))?;
            let (s, e) = (u32::from(start), u32::from(end));
            if e < s {
                return Err(PrefixError::InvalidRange {
                    start: a.to_string(),
                    end: b.to_string(),
                }
                .into());
            }
            return Ok(cidr_span(s, u64::from(e - s) + 1));
        }
    }
    let cidr: Cidr = spec
        .parse()
        .map_err(|_| LabelError::parse(line_no, "bad prefix"))?;
    Ok(vec![cidr])
}
