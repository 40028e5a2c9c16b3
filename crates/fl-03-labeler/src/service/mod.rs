//! Application services implementing the inbound ports.

pub mod labeler;

pub use labeler::Labeler;
