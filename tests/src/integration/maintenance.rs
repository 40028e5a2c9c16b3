//! Maintenance choreography: pruning after bulk load, idle sweeps of
//! observed hosts, and locality propagation from interface discovery.

#![cfg(test)]

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use fl_01_address_tree::{LabelScope, MatchMode, PruneMode, PruneOptions};
use fl_03_labeler::adapters::{load_address_config, load_rir};
use fl_03_labeler::{Labeler, LabelerApi};
use shared_types::{Cidr, FlowRecord};

fn host(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn cidr(s: &str) -> Cidr {
    s.parse().unwrap()
}

#[test]
fn test_rir_load_then_country_prune_aggregates_adjacent_blocks() {
    let labeler = Labeler::default();
    // Two adjacent /24 delegations to the same country.
    load_rir(
        &labeler,
        "x|AU|ipv4|1.0.0.0|256|d|assigned\nx|AU|ipv4|1.0.1.0|256|d|assigned\n",
    )
    .unwrap();

    let removed = labeler.prune(&PruneOptions::new(PruneMode::CountryCode));
    assert!(removed >= 2);

    // The blocks collapsed into their /23 fork, which kept the country.
    assert!(labeler
        .find_address(cidr("1.0.0.0/24"), MatchMode::Exact)
        .is_none());
    let info = labeler
        .find_address(cidr("1.0.0.99"), MatchMode::Longest)
        .unwrap();
    assert_eq!(info.country.as_deref(), Some("AU"));
}

#[test]
fn test_prune_leaves_disagreeing_siblings_alone() {
    let labeler = Labeler::default();
    load_address_config(&labeler, "10.0.0.0/16 alpha\n10.1.0.0/16 beta\n").unwrap();

    let removed = labeler.prune(&PruneOptions::new(PruneMode::Label(LabelScope::Full)));
    assert_eq!(removed, 0);
    assert_eq!(
        labeler
            .find_address(cidr("10.0.0.0/16"), MatchMode::Exact)
            .unwrap()
            .label
            .as_deref(),
        Some("alpha")
    );
    assert_eq!(
        labeler
            .find_address(cidr("10.1.0.0/16"), MatchMode::Exact)
            .unwrap()
            .label
            .as_deref(),
        Some("beta")
    );
}

#[test]
fn test_collapsed_aggregate_still_answers_for_old_leaves() {
    let labeler = Labeler::default();
    load_address_config(
        &labeler,
        "192.168.0.0/16 corp\n192.168.1.0/24 corp\n",
    )
    .unwrap();

    labeler.prune(&PruneOptions::new(PruneMode::Label(LabelScope::Full)));

    // The /24 is gone but every address it covered labels identically.
    assert!(labeler
        .find_address(cidr("192.168.1.0/24"), MatchMode::Exact)
        .is_none());
    let info = labeler
        .find_address(cidr("192.168.1.1"), MatchMode::Longest)
        .unwrap();
    assert_eq!(info.label.as_deref(), Some("corp"));
}

#[test]
fn test_observed_hosts_expire_but_config_survives() {
    let labeler = Labeler::default();
    load_address_config(&labeler, "172.16.0.0/16 dmz\n").unwrap();

    let start = Instant::now();
    let record = FlowRecord {
        saddr: Some(host("172.16.5.5")),
        daddr: Some(host("172.16.5.6")),
        ..FlowRecord::default()
    };
    labeler.observe(&record, start).unwrap();

    // Fresh nodes survive a sweep inside the idle window.
    let removed = labeler.timeout_sweep(
        Duration::from_secs(300),
        start + Duration::from_secs(10),
    );
    assert_eq!(removed, 0);

    let removed = labeler.timeout_sweep(
        Duration::from_secs(300),
        start + Duration::from_secs(3600),
    );
    assert!(removed >= 2);
    assert!(labeler
        .find_address(cidr("172.16.5.5"), MatchMode::Exact)
        .is_none());
    assert_eq!(
        labeler
            .find_address(cidr("172.16.0.0/16"), MatchMode::Exact)
            .unwrap()
            .label
            .as_deref(),
        Some("dmz")
    );
}

#[test]
fn test_interface_discovery_raises_surrounding_locality() {
    let labeler = Labeler::default();
    load_address_config(&labeler, "192.168.0.0/16 corp\n192.168.1.0/24 floor1\n").unwrap();

    labeler.mark_interface(host("192.168.1.1"), 5, 64500).unwrap();

    // Ancestors without their own locality adopt the interface's.
    for prefix in ["192.168.1.0/24", "192.168.0.0/16"] {
        let info = labeler
            .find_address(cidr(prefix), MatchMode::Exact)
            .unwrap();
        assert_eq!(info.locality, 5, "prefix {prefix}");
        assert_eq!(info.asn, 64500, "prefix {prefix}");
    }
}
