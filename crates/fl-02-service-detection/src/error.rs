//! Error types for signature parsing and forest construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed signature line: {0}")]
    Malformed(String),

    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),

    #[error("invalid hex in payload pattern: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid port range {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },
}
