//! End-to-end labeling: load every configuration source, run flows
//! through, and check the assembled labels.

#![cfg(test)]

use std::net::Ipv4Addr;

use fl_01_address_tree::MatchMode;
use fl_03_labeler::adapters::{
    load_address_config, load_port_table, load_rir, load_signatures,
};
use fl_03_labeler::{Labeler, LabelerApi};
use shared_types::{Cidr, FlowRecord, Protocol};

const ADDR_CONFIG: &str = "\
# corporate allocations
192.168.0.0/16 corp locality=3
10.0.0.0/8 lab group=eng
172.16.0.0-172.16.0.255 dmz
";

const RIR: &str = "\
2|apnic|20240101|2|19830613|20240101|+1000
apnic|AU|ipv4|1.0.0.0|256|20110811|assigned
apnic|CN|ipv4|1.0.1.0|256|20110414|allocated
";

const SIGNATURES: &str = r#"
# payload signatures
Service: http tcp port 80 n = 1181 src = "474554202f" dst = "485454502f"
Service: ssl tcp port 443 n = 10
"#;

const PORTS: &str = "\
tcp 6000-6063 x11
udp 123 ntp
";

fn loaded_labeler() -> Labeler {
    let labeler = Labeler::default();
    load_address_config(&labeler, ADDR_CONFIG).expect("address config");
    load_rir(&labeler, RIR).expect("rir");
    load_signatures(&labeler, SIGNATURES).expect("signatures");
    load_port_table(&labeler, PORTS).expect("ports");
    labeler
}

fn host(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn cidr(s: &str) -> Cidr {
    s.parse().unwrap()
}

#[test]
fn test_full_flow_gets_endpoint_and_service_labels() {
    let labeler = loaded_labeler();
    let record = FlowRecord {
        proto: Some(Protocol::Tcp),
        saddr: Some(host("192.168.4.4")),
        sport: 49152,
        daddr: Some(host("10.9.9.9")),
        dport: 80,
        src_payload: Some(b"GET /index.html HTTP/1.1".to_vec()),
        dst_payload: None,
        ..FlowRecord::default()
    };
    assert_eq!(
        labeler.label_flow(&record).as_deref(),
        Some("saddr=corp:daddr=lab:srv=http")
    );
}

#[test]
fn test_rir_country_appears_in_label() {
    let labeler = loaded_labeler();
    let record = FlowRecord {
        saddr: Some(host("1.0.0.77")),
        ..FlowRecord::default()
    };
    assert_eq!(labeler.label_flow(&record).as_deref(), Some("saddr=cco=AU"));
}

#[test]
fn test_address_range_config_covers_whole_range() {
    let labeler = loaded_labeler();
    for probe in ["172.16.0.1", "172.16.0.200", "172.16.0.255"] {
        let info = labeler
            .find_address(cidr(probe), MatchMode::Longest)
            .unwrap();
        assert_eq!(info.label.as_deref(), Some("dmz"), "probe {probe}");
    }
}

#[test]
fn test_encrypted_payload_on_wildcard_port() {
    let labeler = loaded_labeler();
    let noise: Vec<u8> = (0u8..=255).collect();
    // Wildcard flag rides on 443; the unresolved path runs the entropy
    // heuristic against the sample.
    let name = labeler
        .classify_service(Protocol::Tcp, 443, 50000, Some(&noise), None)
        .unwrap();
    assert_eq!(name, "encrypted");
}

#[test]
fn test_port_table_backs_up_signature_miss() {
    let labeler = loaded_labeler();
    let record = FlowRecord {
        proto: Some(Protocol::Udp),
        sport: 40000,
        dport: 123,
        ..FlowRecord::default()
    };
    assert_eq!(labeler.label_flow(&record).as_deref(), Some("srv=ntp"));
}

#[test]
fn test_merge_label_api_round_trip() {
    use fl_03_labeler::MergePolicy;
    let labeler = loaded_labeler();
    let merged = labeler.merge_label("site=ny", "site=la:role=web", MergePolicy::Union);
    assert_eq!(merged, "site=ny,la:role=web");
}

#[test]
fn test_unknown_flow_yields_no_label() {
    let labeler = loaded_labeler();
    let record = FlowRecord {
        proto: Some(Protocol::Tcp),
        saddr: Some(host("100.64.0.1")),
        sport: 1,
        daddr: Some(host("100.64.0.2")),
        dport: 2,
        ..FlowRecord::default()
    };
    assert!(labeler.label_flow(&record).is_none());
}
