//! Signature file reader: one `Service:` line per signature, `#` and `!`
//! comment lines, blank lines ignored.

use tracing::warn;

use crate::error::LabelError;
use crate::ports::inbound::LabelerApi;
use crate::ports::outbound::GeoLookup;
use crate::service::Labeler;

/// Load signature text; returns the number of signatures registered.
pub fn load_signatures<G: GeoLookup>(
    labeler: &Labeler<G>,
    text: &str,
) -> Result<usize, LabelError> {
    let mut loaded = 0;
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if !line.starts_with("Service:") {
            warn!(line = idx + 1, "unrecognized signature line skipped");
            continue;
        }
        labeler
            .load_signature(line)
            .map_err(|e| LabelError::parse(idx + 1, e.to_string()))?;
        loaded += 1;
    }
    Ok(loaded)
}
