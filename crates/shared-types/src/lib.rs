//! # Shared Types Crate
//!
//! This crate contains the domain entities shared across the labeler
//! subsystems: address prefixes, protocols, payload directions, and flow
//! records.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **No I/O**: Pure data types and address arithmetic only; parsing of
//!   configuration files lives in the labeler's adapters.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
