//! # Core Domain Entities
//!
//! Defines the entities every labeler subsystem agrees on:
//!
//! - **Addressing**: [`Cidr`] prefixes and the address arithmetic the trie
//!   and the config readers share ([`cidr_span`]).
//! - **Transport**: [`Protocol`] and payload [`Direction`].
//! - **Flows**: [`FlowRecord`], the unit of classification.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PrefixError;

/// A service name resolved by signature classification.
pub type ServiceName = String;

/// Transport protocol a signature or port label applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol: {other:?}")),
        }
    }
}

/// Which side of a flow a payload sample or signature pattern describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Client-to-server payload (the initiator's bytes).
    Src,
    /// Server-to-client payload (the responder's bytes).
    Dst,
}

/// An IPv4 CIDR prefix: address plus mask length.
///
/// The mask is always derived from `mask_len`; the address is stored
/// untruncated and masked on demand so a host entry keeps its full
/// address even when inserted as a wider prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cidr {
    /// Network-order address bits.
    pub addr: u32,
    /// Prefix length, 0..=32.
    pub mask_len: u8,
}

impl Cidr {
    /// Create a prefix, validating the mask length.
    pub fn new(addr: u32, mask_len: u8) -> Result<Self, PrefixError> {
        if mask_len > 32 {
            return Err(PrefixError::InvalidMaskLength(mask_len));
        }
        Ok(Cidr { addr, mask_len })
    }

    /// A host prefix (`/32`) for a single address.
    pub fn host(addr: Ipv4Addr) -> Self {
        Cidr {
            addr: u32::from(addr),
            mask_len: 32,
        }
    }

    /// The netmask for a prefix length. `/0` is the universal (zero) mask.
    pub fn mask_for(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(len))
        }
    }

    /// This prefix's netmask.
    pub fn mask(&self) -> u32 {
        Self::mask_for(self.mask_len)
    }

    /// The address truncated to the prefix boundary.
    pub fn network(&self) -> u32 {
        self.addr & self.mask()
    }

    /// Whether `other`'s address falls inside this prefix.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.mask_len <= other.mask_len && (other.addr & self.mask()) == self.network()
    }

    /// The bit that discriminates descent below a node of mask length
    /// `pos`: bit `pos` counted from the most significant end.
    pub fn bit_at(addr: u32, pos: u8) -> u32 {
        if pos >= 32 {
            0
        } else {
            (addr >> (31 - u32::from(pos))) & 0x01
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.addr), self.mask_len)
    }
}

impl FromStr for Cidr {
    type Err = PrefixError;

    /// Parses `a.b.c.d`, `a.b.c.d/len`, and the abbreviated dotted forms
    /// (`10`, `10.1`, `10.1.2`) that address config files use; an
    /// abbreviated address without an explicit length gets the natural
    /// mask for the octets given.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, len_part) = match s.split_once('/') {
            Some((a, l)) => (a, Some(l)),
            None => (s, None),
        };

        let octets: Vec<&str> = addr_part.split('.').collect();
        if octets.is_empty() || octets.len() > 4 {
            return Err(PrefixError::InvalidPrefix(s.to_string()));
        }
        let mut addr: u32 = 0;
        for (i, oct) in octets.iter().enumerate() {
            let v: u8 = oct
                .parse()
                .map_err(|_| PrefixError::InvalidPrefix(s.to_string()))?;
            addr |= u32::from(v) << (24 - 8 * i);
        }

        let mask_len = match len_part {
            Some(l) => {
                let len: u8 = l
                    .parse()
                    .map_err(|_| PrefixError::InvalidPrefix(s.to_string()))?;
                if len > 32 {
                    return Err(PrefixError::InvalidMaskLength(len));
                }
                len
            }
            None => (octets.len() * 8) as u8,
        };

        Cidr::new(addr, mask_len)
    }
}

/// Expand `(start, count)` into the minimal list of CIDR blocks covering
/// `count` consecutive addresses beginning at `start`.
///
/// RIR delegation files publish allocations this way. Each step takes the
/// largest power-of-two block that both fits under `count` and is aligned
/// at `start`, then recurses on the remainder.
pub fn cidr_span(start: u32, count: u64) -> Vec<Cidr> {
    let mut out = Vec::new();
    let mut addr = start;
    let mut remaining = count;

    while remaining > 0 {
        // Largest power of two <= remaining, capped by the alignment of addr.
        let mut bits = 63 - remaining.leading_zeros();
        if bits > 32 {
            bits = 32;
        }
        while bits > 0 && addr & ((1u64 << bits) as u32).wrapping_sub(1) != 0 {
            bits -= 1;
        }
        let block = 1u64 << bits;
        out.push(Cidr {
            addr,
            mask_len: (32 - bits) as u8,
        });
        addr = addr.wrapping_add(block as u32);
        remaining -= block;
    }

    out
}

/// One observed network flow, the unit the labeler classifies.
///
/// Payload samples carry the first bytes seen in each direction; `None`
/// means no payload was captured on that side (distinct from an empty
/// capture, which the service validator treats as testable).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowRecord {
    pub proto: Option<Protocol>,
    pub saddr: Option<Ipv4Addr>,
    pub sport: u16,
    pub daddr: Option<Ipv4Addr>,
    pub dport: u16,
    /// First payload bytes sent by the source.
    pub src_payload: Option<Vec<u8>>,
    /// First payload bytes sent by the destination.
    pub dst_payload: Option<Vec<u8>>,
    /// Accumulated label text, if the flow has been enriched.
    pub label: Option<String>,
    /// Packet count, when the collector supplied one.
    pub packets: u64,
    /// Byte count, when the collector supplied one.
    pub bytes: u64,
}
