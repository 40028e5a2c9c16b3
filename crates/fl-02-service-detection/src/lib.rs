//! # FL-02 Service Detection
//!
//! Payload-signature service classification for the flow labeler.
//!
//! ## Architecture
//!
//! - `signature`: [`ServiceSignature`] and the `Service:` line parser
//! - `tree`: per-port and per-offset signature trees ([`ServiceForest`])
//!   with masked, case-tolerant lookup and best-guess accumulation
//! - `entropy`: nibble-entropy heuristic for opaque payloads
//! - `validator`: [`ServiceValidator`], which reconciles source- and
//!   destination-side lookups into one verdict per flow
//!
//! The forest is built once at signature-load time and never mutated
//! afterwards; lookups are read-only and need no synchronization.

pub mod entropy;
pub mod error;
pub mod signature;
pub mod tree;
pub mod validator;

pub use entropy::{entropy_pct, looks_encrypted};
pub use error::SignatureError;
pub use signature::{parse_signature, ServiceSignature, SIG_LENGTH};
pub use tree::{BestGuess, ServiceForest, SrvTree};
pub use validator::ServiceValidator;
