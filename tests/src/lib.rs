//! # flowlabel Test Suite
//!
//! Unified test crate for cross-crate scenarios.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Config-to-label choreography
//!     ├── labeling.rs      # file load -> trie/forest -> flow -> label
//!     └── maintenance.rs   # prune, idle sweep, locality propagation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p fl-tests
//!
//! # By category
//! cargo test -p fl-tests integration::
//!
//! # Benchmarks
//! cargo bench -p fl-tests
//! ```

pub mod integration;
