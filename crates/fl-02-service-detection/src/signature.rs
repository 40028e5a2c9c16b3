//! Service signature model and single-line parser.
//!
//! A signature fingerprints an application service by the first bytes of
//! payload seen in each direction, with a per-byte wildcard mask. The text
//! form is one line per service:
//!
//! ```text
//! Service: http tcp port 80 n = 1181 src = "474554202f" dst = "485454502f"
//! ```
//!
//! Patterns are hex pairs; a pair of spaces wildcards that byte. Ports may
//! be a single number or an inclusive `start-end` range. A line with no
//! quoted pattern declares the port's payload opaque (likely encrypted)
//! and matches anything.

use shared_types::{Direction, Protocol};

use crate::error::SignatureError;

/// Fixed pattern length in bytes; payload beyond this never participates
/// in matching.
pub const SIG_LENGTH: usize = 32;

/// One parsed service signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSignature {
    pub name: String,
    pub proto: Protocol,
    /// Inclusive port range the signature applies to.
    pub port_start: u16,
    pub port_end: u16,
    pub src_pattern: [u8; SIG_LENGTH],
    pub dst_pattern: [u8; SIG_LENGTH],
    /// Bit `i` set means byte `i` is a wildcard.
    pub src_mask: u32,
    pub dst_mask: u32,
    /// Flows that produced this signature; confidence weight.
    pub sample_count: u64,
    /// The payload is expected to be fully opaque; any sample matches.
    pub wildcard_all: bool,
}

impl ServiceSignature {
    pub fn pattern(&self, dir: Direction) -> &[u8; SIG_LENGTH] {
        match dir {
            Direction::Src => &self.src_pattern,
            Direction::Dst => &self.dst_pattern,
        }
    }

    pub fn mask(&self, dir: Direction) -> u32 {
        match dir {
            Direction::Src => self.src_mask,
            Direction::Dst => self.dst_mask,
        }
    }

    pub fn is_wild(mask: u32, i: usize) -> bool {
        (mask >> i) & 1 == 1
    }

    /// Index of the first non-wildcard byte for `dir`, if any.
    pub fn first_solid_offset(&self, dir: Direction) -> Option<usize> {
        let mask = self.mask(dir);
        (0..SIG_LENGTH).find(|&i| !Self::is_wild(mask, i))
    }

    /// Whether `dir` has any byte worth comparing.
    pub fn has_pattern(&self, dir: Direction) -> bool {
        self.mask(dir) != u32::MAX
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.port_start..=self.port_end
    }
}

/// Parse one `Service:` line.
pub fn parse_signature(line: &str) -> Result<ServiceSignature, SignatureError> {
    let rest = line
        .trim()
        .strip_prefix("Service:")
        .ok_or_else(|| SignatureError::Malformed(line.to_string()))?;

    // Quoted pattern sections come last; split them off before
    // tokenizing the head.
    let (head, quoted) = split_quoted(rest);
    let mut tokens = head.split_whitespace();

    let name = tokens
        .next()
        .ok_or_else(|| SignatureError::Malformed(line.to_string()))?
        .to_string();
    let proto_token = tokens
        .next()
        .ok_or_else(|| SignatureError::Malformed(line.to_string()))?;
    let proto: Protocol = proto_token
        .parse()
        .map_err(|_| SignatureError::UnknownProtocol(proto_token.to_string()))?;

    if tokens.next() != Some("port") {
        return Err(SignatureError::Malformed(line.to_string()));
    }
    let ports = tokens
        .next()
        .ok_or_else(|| SignatureError::Malformed(line.to_string()))?;
    let (port_start, port_end) = parse_port_range(ports, line)?;
    if port_end < port_start {
        return Err(SignatureError::InvalidPortRange {
            start: port_start,
            end: port_end,
        });
    }

    // Optional sample count: `n = <count>`.
    let mut sample_count = 0u64;
    let remaining: Vec<&str> = tokens.collect();
    for w in remaining.windows(3) {
        if w[0] == "n" && w[1] == "=" {
            sample_count = w[2]
                .parse()
                .map_err(|_| SignatureError::Malformed(line.to_string()))?;
        }
    }

    let (src_text, dst_text) = quoted;
    let wildcard_all = src_text.is_none() && dst_text.is_none();

    let (src_pattern, src_mask) = match src_text {
        Some(t) => decode_pattern(t)?,
        None => ([0u8; SIG_LENGTH], u32::MAX),
    };
    let (dst_pattern, dst_mask) = match dst_text {
        Some(t) => decode_pattern(t)?,
        None => ([0u8; SIG_LENGTH], u32::MAX),
    };

    Ok(ServiceSignature {
        name,
        proto,
        port_start,
        port_end,
        src_pattern,
        dst_pattern,
        src_mask,
        dst_mask,
        sample_count,
        // Two fully-wildcarded patterns are opaque too.
        wildcard_all: wildcard_all || (src_mask == u32::MAX && dst_mask == u32::MAX),
    })
}

fn parse_port_range(spec: &str, line: &str) -> Result<(u16, u16), SignatureError> {
    match spec.split_once('-') {
        Some((a, b)) => {
            let start = a
                .parse()
                .map_err(|_| SignatureError::Malformed(line.to_string()))?;
            let end = b
                .parse()
                .map_err(|_| SignatureError::Malformed(line.to_string()))?;
            Ok((start, end))
        }
        None => {
            let p = spec
                .parse()
                .map_err(|_| SignatureError::Malformed(line.to_string()))?;
            Ok((p, p))
        }
    }
}

/// Split the head of the line from its quoted pattern texts. The first
/// quoted string is the source pattern, the second the destination; the
/// optional `src =` / `dst =` tags may reorder them.
fn split_quoted(rest: &str) -> (&str, (Option<&str>, Option<&str>)) {
    let head_end = rest.find('"').unwrap_or(rest.len());
    let head = &rest[..head_end];

    let mut src = None;
    let mut dst = None;
    let mut fields = Vec::new();
    let mut from = 0;
    while let Some(open) = rest[from..].find('"').map(|i| from + i) {
        // The tag of the first field sits at the end of the head; later
        // tags sit between the previous closing quote and this one.
        let tag = pattern_tag(&rest[from..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('"') else { break };
        fields.push((tag, &after[..close]));
        from = open + 1 + close + 1;
    }
    for (i, (tag, text)) in fields.iter().enumerate() {
        match (*tag, i) {
            ("src", _) | ("", 0) => src = Some(*text),
            ("dst", _) | ("", 1) => dst = Some(*text),
            _ => {}
        }
    }
    (head, (src, dst))
}

/// The `src` / `dst` spelled out before an opening quote, if any.
fn pattern_tag(lead: &str) -> &'static str {
    let Some(stripped) = lead.trim_end().strip_suffix('=') else {
        return "";
    };
    match stripped.split_whitespace().last() {
        Some("src") => "src",
        Some("dst") => "dst",
        _ => "",
    }
}

/// Decode a hex-pair pattern string. A two-space pair wildcards that byte;
/// bytes past the end of the text are wildcards too.
fn decode_pattern(text: &str) -> Result<([u8; SIG_LENGTH], u32), SignatureError> {
    if !text.is_ascii() {
        return Err(SignatureError::Malformed(text.to_string()));
    }
    let mut pattern = [0u8; SIG_LENGTH];
    let mut mask = 0u32;
    let pairs = text.len() / 2;
    for i in 0..SIG_LENGTH {
        if i >= pairs {
            mask |= 1 << i;
            continue;
        }
        let pair = &text[i * 2..i * 2 + 2];
        if pair == "  " {
            mask |= 1 << i;
        } else {
            let byte = hex::decode(pair)?;
            pattern[i] = byte[0];
        }
    }
    Ok((pattern, mask))
}
