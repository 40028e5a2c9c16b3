//! Labeler error type; wraps the core crates' errors and adds config
//! parse failures.

use fl_01_address_tree::TreeError;
use fl_02_service_detection::SignatureError;
use shared_types::PrefixError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Prefix(#[from] PrefixError),

    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },
}

impl LabelError {
    pub(crate) fn parse(line: usize, msg: impl Into<String>) -> Self {
        LabelError::Parse {
            line,
            msg: msg.into(),
        }
    }
}
