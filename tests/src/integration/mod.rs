//! Cross-crate integration scenarios: configuration files in, labels out.

pub mod labeling;
pub mod maintenance;
