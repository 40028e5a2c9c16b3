//! Per-flow service resolution: combine source- and destination-side
//! signature lookups into one verdict.
//!
//! The two directions are scored independently and then reconciled; the
//! priority order below is load-bearing (bidirectional agreement beats
//! either side alone, exact port matches beat near misses, and the
//! source side wins residual ties).

use std::sync::Arc;

use shared_types::{Direction, Protocol};
use tracing::trace;

use crate::entropy::looks_encrypted;
use crate::signature::{ServiceSignature, SIG_LENGTH};
use crate::tree::{BestGuess, ServiceForest};

/// Tuned near-miss acceptance floors; scores must strictly exceed them.
/// The two directions were tuned independently.
const SRC_GUESS_MIN: u32 = 5;
const DST_GUESS_MIN: u32 = 4;

/// One direction's resolution and how it was reached.
#[derive(Debug, Clone)]
struct DirVerdict {
    sig: Arc<ServiceSignature>,
    /// True for a port-tree match, false for an accepted near miss.
    exact: bool,
}

/// Resolves a service identity per flow from an immutable forest.
#[derive(Debug)]
pub struct ServiceValidator {
    forest: ServiceForest,
    /// Sentinel returned when the entropy heuristic fires on an
    /// opaque-payload port.
    encrypted: Arc<ServiceSignature>,
}

impl ServiceValidator {
    pub fn new(forest: ServiceForest) -> Self {
        ServiceValidator {
            forest,
            encrypted: Arc::new(ServiceSignature {
                name: "encrypted".to_string(),
                proto: Protocol::Tcp,
                port_start: 0,
                port_end: 0,
                src_pattern: [0; SIG_LENGTH],
                dst_pattern: [0; SIG_LENGTH],
                src_mask: u32::MAX,
                dst_mask: u32::MAX,
                sample_count: 0,
                wildcard_all: true,
            }),
        }
    }

    pub fn forest(&self) -> &ServiceForest {
        &self.forest
    }

    /// Mutable forest access for the bulk-load phase; the forest must not
    /// change once flows are being classified.
    pub fn forest_mut(&mut self) -> &mut ServiceForest {
        &mut self.forest
    }

    /// Classify one flow's payload samples into a service signature.
    ///
    /// `src_sample` is payload sent by the client toward `dport`;
    /// `dst_sample` is the server's response. `None` means that side was
    /// never captured.
    pub fn classify(
        &self,
        proto: Protocol,
        sport: u16,
        dport: u16,
        src_sample: Option<&[u8]>,
        dst_sample: Option<&[u8]>,
    ) -> Option<Arc<ServiceSignature>> {
        if src_sample.is_none() && dst_sample.is_none() {
            // Nothing to test: the port tree root is the only guess.
            return self
                .forest
                .port_guess(proto, Direction::Src, dport)
                .or_else(|| self.forest.port_guess(proto, Direction::Src, sport));
        }

        // Client payload is tested against the server-port bucket, server
        // payload against the client-port bucket.
        let srv_src = src_sample.and_then(|s| {
            self.resolve_dir(proto, Direction::Src, dport, s, SRC_GUESS_MIN)
        });
        let srv_dst = dst_sample.and_then(|s| {
            self.resolve_dir(proto, Direction::Dst, sport, s, DST_GUESS_MIN)
        });

        match (srv_src, srv_dst) {
            (Some(s), Some(d)) => {
                if s.sig.name == d.sig.name {
                    return Some(s.sig);
                }
                trace!(src = %s.sig.name, dst = %d.sig.name, "directions disagree");
                // An exact side outranks a near miss; the source side wins
                // when ranks are equal.
                match (s.exact, d.exact) {
                    (true, false) => Some(s.sig),
                    (false, true) => Some(d.sig),
                    _ => Some(s.sig),
                }
            }
            (Some(s), None) => Some(s.sig),
            (None, Some(d)) => Some(d.sig),
            (None, None) => self.unresolved(proto, sport, dport, src_sample, dst_sample),
        }
    }

    fn resolve_dir(
        &self,
        proto: Protocol,
        dir: Direction,
        port: u16,
        sample: &[u8],
        guess_min: u32,
    ) -> Option<DirVerdict> {
        let mut best = BestGuess::default();
        if let Some(sig) = self.forest.find(proto, dir, port, sample, &mut best) {
            return Some(DirVerdict { sig, exact: true });
        }
        if best.score > guess_min {
            if let Some(sig) = best.sig {
                return Some(DirVerdict { sig, exact: false });
            }
        }
        None
    }

    /// Neither direction resolved: encryption heuristic on opaque ports,
    /// then the per-offset fallback scan.
    fn unresolved(
        &self,
        proto: Protocol,
        sport: u16,
        dport: u16,
        src_sample: Option<&[u8]>,
        dst_sample: Option<&[u8]>,
    ) -> Option<Arc<ServiceSignature>> {
        if self.forest.is_wildcard_port(proto, dport) || self.forest.is_wildcard_port(proto, sport)
        {
            let fired = src_sample.map(looks_encrypted).unwrap_or(false)
                || dst_sample.map(looks_encrypted).unwrap_or(false);
            if fired {
                return Some(Arc::clone(&self.encrypted));
            }
        }

        if let Some(s) = src_sample {
            if let Some(sig) = self.forest.offset_scan(proto, Direction::Src, s) {
                return Some(sig);
            }
        }
        if let Some(s) = dst_sample {
            if let Some(sig) = self.forest.offset_scan(proto, Direction::Dst, s) {
                return Some(sig);
            }
        }
        None
    }
}
