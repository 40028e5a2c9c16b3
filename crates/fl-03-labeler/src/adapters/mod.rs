//! Configuration-file adapters feeding the labeler service.

pub mod address_config;
pub mod ports_file;
pub mod rir;
pub mod signature_reader;

pub use address_config::load_address_config;
pub use ports_file::load_port_table;
pub use rir::load_rir;
pub use signature_reader::load_signatures;
