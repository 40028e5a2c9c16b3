//! Port label table reader: `<proto> <port[-port]> <label>` per line.

use crate::error::LabelError;
use crate::ports::outbound::GeoLookup;
use crate::service::Labeler;

/// Load port table text; returns the number of ranges added.
pub fn load_port_table<G: GeoLookup>(
    labeler: &Labeler<G>,
    text: &str,
) -> Result<usize, LabelError> {
    let mut loaded = 0;
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or(raw).trim();
        if line.is_empty() {
            continue;
        }
        labeler.add_port_line(idx + 1, line)?;
        loaded += 1;
    }
    Ok(loaded)
}
