//! Domain logic: label algebra and the static port-label table.

pub mod label;
pub mod port_table;

pub use label::{merge_label, MergePolicy};
pub use port_table::PortTable;
