//! fl-label: enrich flow descriptions with classification labels.
//!
//! Loads address, RIR, signature, and port-table configuration, then reads
//! flow descriptions on stdin, one per line:
//!
//! ```text
//! proto sip sport dip dport [src-payload-hex] [dst-payload-hex]
//! ```
//!
//! and prints the enrichment label per flow (`-` when nothing matched).

use std::fs;
use std::io::{self, BufRead, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fl_03_labeler::adapters::{load_address_config, load_port_table, load_rir, load_signatures};
use fl_03_labeler::{Labeler, LabelerApi};
use shared_types::{FlowRecord, Protocol};

#[derive(Parser, Debug)]
#[command(name = "fl-label")]
#[command(about = "Label network flows from address and service signature configuration")]
struct Args {
    /// Address/locality configuration file
    #[arg(long)]
    addr_config: Option<PathBuf>,

    /// RIR delegation file (country codes)
    #[arg(long)]
    rir: Option<PathBuf>,

    /// Service signature file
    #[arg(long)]
    signatures: Option<PathBuf>,

    /// Port label table file
    #[arg(long)]
    ports: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let labeler = Labeler::default();

    if let Some(path) = &args.addr_config {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading address config {}", path.display()))?;
        let n = load_address_config(&labeler, &text)?;
        info!(entries = n, path = %path.display(), "address config loaded");
    }
    if let Some(path) = &args.rir {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading RIR file {}", path.display()))?;
        let n = load_rir(&labeler, &text)?;
        info!(blocks = n, path = %path.display(), "RIR delegations loaded");
    }
    if let Some(path) = &args.signatures {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading signatures {}", path.display()))?;
        let n = load_signatures(&labeler, &text)?;
        info!(signatures = n, path = %path.display(), "signatures loaded");
    }
    if let Some(path) = &args.ports {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading port table {}", path.display()))?;
        let n = load_port_table(&labeler, &text)?;
        info!(ranges = n, path = %path.display(), "port table loaded");
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = parse_flow(trimmed)?;
        match labeler.label_flow(&record) {
            Some(label) => writeln!(out, "{label}")?,
            None => writeln!(out, "-")?,
        }
    }
    Ok(())
}

fn parse_flow(line: &str) -> Result<FlowRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        bail!("flow line needs at least `proto sip sport dip dport`: {line:?}");
    }
    let proto: Protocol = tokens[0]
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let saddr: Ipv4Addr = tokens[1].parse().context("bad source address")?;
    let sport: u16 = tokens[2].parse().context("bad source port")?;
    let daddr: Ipv4Addr = tokens[3].parse().context("bad destination address")?;
    let dport: u16 = tokens[4].parse().context("bad destination port")?;

    let sample = |i: usize| -> Result<Option<Vec<u8>>> {
        match tokens.get(i) {
            None => Ok(None),
            Some(&"-") => Ok(None),
            Some(t) => Ok(Some(hex::decode(t).context("bad payload hex")?)),
        }
    };

    Ok(FlowRecord {
        proto: Some(proto),
        saddr: Some(saddr),
        sport,
        daddr: Some(daddr),
        dport,
        src_payload: sample(5)?,
        dst_payload: sample(6)?,
        ..FlowRecord::default()
    })
}
