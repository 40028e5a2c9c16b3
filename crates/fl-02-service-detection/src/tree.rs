//! Per-port, per-protocol signature trees and the forest that owns them.
//!
//! Each tree is a binary search tree ordered by the payload byte at the
//! first position where two signatures visibly differ. Lookup tolerates
//! ASCII case differences and, when descent dead-ends, keeps the
//! best-scoring near miss as an explicit accumulator threaded through the
//! recursion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shared_types::{Direction, Protocol};
use tracing::debug;

use crate::signature::{ServiceSignature, SIG_LENGTH};

/// A near-miss candidate: the signature where descent stopped and how many
/// of its bytes agreed with the sample (wildcards count as agreement).
#[derive(Debug, Clone, Default)]
pub struct BestGuess {
    pub sig: Option<Arc<ServiceSignature>>,
    pub score: u32,
}

impl BestGuess {
    fn offer(&mut self, sig: &Arc<ServiceSignature>, score: u32) {
        if score > self.score {
            self.sig = Some(Arc::clone(sig));
            self.score = score;
        }
    }
}

#[derive(Debug)]
struct SrvNode {
    sig: Arc<ServiceSignature>,
    left: Option<Box<SrvNode>>,
    right: Option<Box<SrvNode>>,
}

/// One ordered signature tree; comparisons look at one direction's pattern
/// starting at a fixed byte offset.
#[derive(Debug)]
pub struct SrvTree {
    dir: Direction,
    /// First byte index comparisons consider.
    start: usize,
    root: Option<Box<SrvNode>>,
}

impl SrvTree {
    fn new(dir: Direction, start: usize) -> Self {
        SrvTree {
            dir,
            start,
            root: None,
        }
    }

    /// The root signature, used as a port-level guess when a flow carries
    /// no payload at all.
    pub fn root_sig(&self) -> Option<Arc<ServiceSignature>> {
        self.root.as_ref().map(|n| Arc::clone(&n.sig))
    }

    fn insert(&mut self, sig: Arc<ServiceSignature>) {
        match self.root.take() {
            None => {
                self.root = Some(Box::new(SrvNode {
                    sig,
                    left: None,
                    right: None,
                }));
            }
            Some(root) => {
                self.root = Some(Self::insert_node(root, sig, self.dir, self.start));
            }
        }
    }

    fn insert_node(
        mut node: Box<SrvNode>,
        sig: Arc<ServiceSignature>,
        dir: Direction,
        start: usize,
    ) -> Box<SrvNode> {
        // First byte, unmasked in the resident node, where the candidate
        // differs; equal everywhere means duplicate.
        let npat = node.sig.pattern(dir);
        let nmask = node.sig.mask(dir);
        let cpat = sig.pattern(dir);
        let diff = (start..SIG_LENGTH)
            .find(|&i| !ServiceSignature::is_wild(nmask, i) && cpat[i] != npat[i]);

        match diff {
            None => {
                debug!(name = %sig.name, "duplicate signature dropped");
                node
            }
            Some(i) if cpat[i] > npat[i] => {
                node.left = Some(match node.left.take() {
                    Some(l) => Self::insert_node(l, sig, dir, start),
                    None => Box::new(SrvNode {
                        sig,
                        left: None,
                        right: None,
                    }),
                });
                node
            }
            Some(_) => {
                node.right = Some(match node.right.take() {
                    Some(r) => Self::insert_node(r, sig, dir, start),
                    None => Box::new(SrvNode {
                        sig,
                        left: None,
                        right: None,
                    }),
                });
                node
            }
        }
    }

    /// Match `sample` against the tree. An exact (possibly case-folded)
    /// match returns the signature; a dead end records the near miss in
    /// `best` and returns `None`.
    pub fn find(&self, sample: &[u8], best: &mut BestGuess) -> Option<Arc<ServiceSignature>> {
        self.root
            .as_deref()
            .and_then(|root| self.find_node(root, sample, best))
    }

    fn find_node(
        &self,
        node: &SrvNode,
        sample: &[u8],
        best: &mut BestGuess,
    ) -> Option<Arc<ServiceSignature>> {
        if node.sig.wildcard_all {
            return Some(Arc::clone(&node.sig));
        }

        let pat = node.sig.pattern(self.dir);
        let mask = node.sig.mask(self.dir);
        let mut agreed = 0u32;
        let mut mismatch = None;

        for i in self.start..SIG_LENGTH {
            if ServiceSignature::is_wild(mask, i) {
                agreed += 1;
                continue;
            }
            match sample.get(i) {
                Some(&b) if b == pat[i] || b.eq_ignore_ascii_case(&pat[i]) => agreed += 1,
                other => {
                    if mismatch.is_none() {
                        mismatch = Some((i, other.copied().unwrap_or(0)));
                    }
                }
            }
        }

        let Some((i, sample_byte)) = mismatch else {
            return Some(Arc::clone(&node.sig));
        };

        best.offer(&node.sig, agreed);

        let next = if sample_byte > pat[i] {
            node.left.as_deref()
        } else {
            node.right.as_deref()
        };
        next.and_then(|n| self.find_node(n, sample, best))
    }
}

/// Trees for one `(protocol, direction)` pair.
#[derive(Debug, Default)]
struct DirectionalTrees {
    /// Keyed by the port the signature was registered against.
    by_port: HashMap<u16, SrvTree>,
    /// Fallback trees bucketed by the first non-wildcard byte offset,
    /// scanned shortest wildcard prefix first.
    by_offset: Vec<Option<SrvTree>>,
}

impl DirectionalTrees {
    fn new() -> Self {
        DirectionalTrees {
            by_port: HashMap::new(),
            by_offset: (0..SIG_LENGTH).map(|_| None).collect(),
        }
    }
}

/// All signature trees for a labeler instance; immutable after load.
#[derive(Debug, Default)]
pub struct ServiceForest {
    dirs: HashMap<(Protocol, Direction), DirectionalTrees>,
    /// Ports whose signature declared the payload fully opaque.
    wildcard_ports: HashSet<(Protocol, u16)>,
    len: usize,
}

impl ServiceForest {
    pub fn new() -> Self {
        ServiceForest::default()
    }

    /// Number of signatures accepted.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a fully-wildcarded signature covers this port.
    pub fn is_wildcard_port(&self, proto: Protocol, port: u16) -> bool {
        self.wildcard_ports.contains(&(proto, port))
    }

    pub fn insert(&mut self, sig: ServiceSignature) {
        let sig = Arc::new(sig);
        self.len += 1;

        if sig.wildcard_all {
            // Opaque-payload signature: it owns the whole port in both
            // directions.
            for port in sig.ports() {
                self.wildcard_ports.insert((sig.proto, port));
                for dir in [Direction::Src, Direction::Dst] {
                    let trees = self.dir_trees(sig.proto, dir);
                    let tree = trees
                        .by_port
                        .entry(port)
                        .or_insert_with(|| SrvTree::new(dir, 0));
                    tree.root = Some(Box::new(SrvNode {
                        sig: Arc::clone(&sig),
                        left: None,
                        right: None,
                    }));
                }
            }
            return;
        }

        for dir in [Direction::Src, Direction::Dst] {
            if !sig.has_pattern(dir) {
                continue;
            }
            let offset = sig.first_solid_offset(dir).unwrap_or(0);
            let ports: Vec<u16> = sig.ports().collect();
            let trees = self.dir_trees(sig.proto, dir);
            for &port in &ports {
                trees
                    .by_port
                    .entry(port)
                    .or_insert_with(|| SrvTree::new(dir, 0))
                    .insert(Arc::clone(&sig));
            }
            trees.by_offset[offset]
                .get_or_insert_with(|| SrvTree::new(dir, offset))
                .insert(Arc::clone(&sig));
        }
    }

    fn dir_trees(&mut self, proto: Protocol, dir: Direction) -> &mut DirectionalTrees {
        self.dirs
            .entry((proto, dir))
            .or_insert_with(DirectionalTrees::new)
    }

    /// Look `sample` up in the port tree for `(proto, dir, port)`.
    pub fn find(
        &self,
        proto: Protocol,
        dir: Direction,
        port: u16,
        sample: &[u8],
        best: &mut BestGuess,
    ) -> Option<Arc<ServiceSignature>> {
        self.dirs
            .get(&(proto, dir))
            .and_then(|t| t.by_port.get(&port))
            .and_then(|tree| tree.find(sample, best))
    }

    /// The root signature of a port tree, as a no-payload guess.
    pub fn port_guess(
        &self,
        proto: Protocol,
        dir: Direction,
        port: u16,
    ) -> Option<Arc<ServiceSignature>> {
        self.dirs
            .get(&(proto, dir))
            .and_then(|t| t.by_port.get(&port))
            .and_then(|tree| tree.root_sig())
    }

    /// Last-resort scan over the per-offset trees, shortest wildcard
    /// prefix first, stopping at the first exact match.
    pub fn offset_scan(
        &self,
        proto: Protocol,
        dir: Direction,
        sample: &[u8],
    ) -> Option<Arc<ServiceSignature>> {
        let trees = self.dirs.get(&(proto, dir))?;
        for tree in trees.by_offset.iter().flatten() {
            let mut scratch = BestGuess::default();
            if let Some(sig) = tree.find(sample, &mut scratch) {
                return Some(sig);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::parse_signature;

    fn sig(line: &str) -> ServiceSignature {
        parse_signature(line).unwrap()
    }

    fn forest(lines: &[&str]) -> ServiceForest {
        let mut f = ServiceForest::new();
        for l in lines {
            f.insert(sig(l));
        }
        f
    }

    fn pad(prefix: &[u8]) -> Vec<u8> {
        let mut v = prefix.to_vec();
        v.resize(SIG_LENGTH, 0);
        v
    }

    #[test]
    fn test_exact_match_on_port_tree() {
        let f = forest(&[r#"Service: http tcp port 80 src = "474554202f""#]);
        let mut best = BestGuess::default();
        let hit = f
            .find(Protocol::Tcp, Direction::Src, 80, b"GET /index.html", &mut best)
            .unwrap();
        assert_eq!(hit.name, "http");
    }

    #[test]
    fn test_case_insensitive_bytes_still_match() {
        let f = forest(&[r#"Service: http tcp port 80 src = "474554202f""#]);
        let mut best = BestGuess::default();
        let hit = f.find(Protocol::Tcp, Direction::Src, 80, b"get /index.html", &mut best);
        assert_eq!(hit.unwrap().name, "http");
    }

    #[test]
    fn test_wildcard_byte_tolerates_any_value() {
        // Byte 1 is wildcarded: G?T matches GET, GXT, G0T.
        let f = forest(&[r#"Service: x tcp port 9 src = "47  54""#]);
        for sample in [&b"GET"[..], b"GXT", b"G0T"] {
            let mut best = BestGuess::default();
            assert!(
                f.find(Protocol::Tcp, Direction::Src, 9, sample, &mut best)
                    .is_some(),
                "sample {sample:?} should match"
            );
        }
        let mut best = BestGuess::default();
        assert!(f
            .find(Protocol::Tcp, Direction::Src, 9, b"XET", &mut best)
            .is_none());
    }

    #[test]
    fn test_mismatch_records_best_guess() {
        let f = forest(&[r#"Service: http tcp port 80 src = "474554202f""#]);
        let mut best = BestGuess::default();
        // Agrees on "GET " but not "/": four solid bytes plus all the
        // trailing wildcards agree.
        let miss = f.find(Protocol::Tcp, Direction::Src, 80, &pad(b"GET X"), &mut best);
        assert!(miss.is_none());
        assert_eq!(best.sig.as_ref().unwrap().name, "http");
        assert_eq!(best.score, 4 + (SIG_LENGTH as u32 - 5));
    }

    #[test]
    fn test_siblings_with_shared_prefix_both_found() {
        let f = forest(&[
            r#"Service: http tcp port 80 src = "474554202f""#,
            r#"Service: webdav tcp port 80 src = "50524f5046""#,
        ]);
        let mut best = BestGuess::default();
        assert_eq!(
            f.find(Protocol::Tcp, Direction::Src, 80, b"GET /", &mut best)
                .unwrap()
                .name,
            "http"
        );
        assert_eq!(
            f.find(Protocol::Tcp, Direction::Src, 80, b"PROPFIND", &mut best)
                .unwrap()
                .name,
            "webdav"
        );
    }

    #[test]
    fn test_wildcard_all_owns_the_port() {
        let f = forest(&[
            r#"Service: http tcp port 443 src = "474554202f""#,
            "Service: ssl tcp port 443",
        ]);
        assert!(f.is_wildcard_port(Protocol::Tcp, 443));
        let mut best = BestGuess::default();
        let hit = f
            .find(Protocol::Tcp, Direction::Src, 443, &[0x16, 0x03, 0x01], &mut best)
            .unwrap();
        assert_eq!(hit.name, "ssl");
    }

    #[test]
    fn test_offset_scan_finds_shifted_pattern() {
        let f = forest(&[
            r#"Service: rtsp tcp port 554 src = "525453502f""#,
            r#"Service: shift tcp port 999 src = "    6c6f""#,
        ]);
        // No port context at all: the offset buckets still find both.
        assert_eq!(
            f.offset_scan(Protocol::Tcp, Direction::Src, b"RTSP/1.0")
                .unwrap()
                .name,
            "rtsp"
        );
        assert_eq!(
            f.offset_scan(Protocol::Tcp, Direction::Src, b"xxlo")
                .unwrap()
                .name,
            "shift"
        );
    }

    #[test]
    fn test_port_guess_returns_root() {
        let f = forest(&[r#"Service: http tcp port 80 src = "474554202f""#]);
        assert_eq!(
            f.port_guess(Protocol::Tcp, Direction::Src, 80).unwrap().name,
            "http"
        );
        assert!(f.port_guess(Protocol::Tcp, Direction::Src, 81).is_none());
    }
}
