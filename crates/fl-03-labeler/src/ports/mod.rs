//! Hexagonal ports: the labeler's driving API and driven collaborators.

pub mod inbound;
pub mod outbound;

pub use inbound::{AddressInfo, LabelerApi};
pub use outbound::{GeoLookup, NoGeo};
