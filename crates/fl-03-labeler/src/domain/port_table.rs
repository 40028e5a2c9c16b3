//! Static port-to-label table, the last resort when signature
//! classification yields nothing.

use shared_types::Protocol;

use crate::error::LabelError;

#[derive(Debug, Clone)]
struct PortRange {
    proto: Protocol,
    start: u16,
    end: u16,
    label: String,
}

/// Per-protocol inclusive port ranges carrying a label.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    ranges: Vec<PortRange>,
}

impl PortTable {
    pub fn new() -> Self {
        PortTable::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn add(&mut self, proto: Protocol, start: u16, end: u16, label: impl Into<String>) {
        self.ranges.push(PortRange {
            proto,
            start,
            end,
            label: label.into(),
        });
    }

    /// First matching range wins; entries are consulted in load order.
    pub fn lookup(&self, proto: Protocol, port: u16) -> Option<&str> {
        self.ranges
            .iter()
            .find(|r| r.proto == proto && r.start <= port && port <= r.end)
            .map(|r| r.label.as_str())
    }

    /// Parse one `<proto> <port[-port]> <label>` line into the table.
    pub fn add_line(&mut self, line_no: usize, line: &str) -> Result<(), LabelError> {
        let mut tokens = line.split_whitespace();
        let proto: Protocol = tokens
            .next()
            .ok_or_else(|| LabelError::parse(line_no, "missing protocol"))?
            .parse()
            .map_err(|e: String| LabelError::parse(line_no, e))?;
        let ports = tokens
            .next()
            .ok_or_else(|| LabelError::parse(line_no, "missing port"))?;
        let (start, end) = match ports.split_once('-') {
            Some((a, b)) => (
                a.parse()
                    .map_err(|_| LabelError::parse(line_no, "bad port"))?,
                b.parse()
                    .map_err(|_| LabelError::parse(line_no, "bad port"))?,
            ),
            None => {
                let p: u16 = ports
                    .parse()
                    .map_err(|_| LabelError::parse(line_no, "bad port"))?;
                (p, p)
            }
        };
        if end < start {
            return Err(LabelError::parse(line_no, "reversed port range"));
        }
        let label: String = tokens.collect::<Vec<_>>().join(" ");
        if label.is_empty() {
            return Err(LabelError::parse(line_no, "missing label"));
        }
        self.add(proto, start, end, label);
        Ok(())
    }
}
