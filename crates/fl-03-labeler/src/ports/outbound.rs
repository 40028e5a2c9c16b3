//! Driven ports: external collaborators the labeler consumes.

use std::net::Ipv4Addr;

/// Geographic lookup provider. Implementations wrap an external database;
/// the labeler only consumes the returned text, merging it into the
/// address label.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, addr: Ipv4Addr) -> Option<String>;
}

/// Provider that knows nothing; the default for tests and for
/// installations without a geo database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeo;

impl GeoLookup for NoGeo {
    fn lookup(&self, _addr: Ipv4Addr) -> Option<String> {
        None
    }
}
