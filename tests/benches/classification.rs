//! Classification hot-path benchmarks: longest-prefix lookup over a
//! populated trie and signature matching against a loaded forest.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use fl_01_address_tree::{AddressTrie, MatchMode, NodeAttrs, NodeStatus};
use fl_02_service_detection::{parse_signature, BestGuess, ServiceForest};
use shared_types::{Cidr, Direction, Protocol};

fn bench_longest_match(c: &mut Criterion) {
    let mut trie = AddressTrie::new();
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..10_000u32 {
        let addr: u32 = rng.gen();
        let len = rng.gen_range(8..=24);
        let cidr = Cidr {
            addr: addr & Cidr::mask_for(len),
            mask_len: len,
        };
        let _ = trie.insert(cidr, NodeAttrs::with_label(format!("net{i}")), NodeStatus::EMPTY);
    }

    c.bench_function("address_trie_longest_match", |b| {
        b.iter(|| {
            let host = Cidr {
                addr: rng.gen(),
                mask_len: 32,
            };
            black_box(trie.find(host, MatchMode::Longest))
        })
    });
}

fn bench_signature_lookup(c: &mut Criterion) {
    let mut forest = ServiceForest::new();
    for line in [
        r#"Service: http tcp port 80 src = "474554202f""#,
        r#"Service: webdav tcp port 80 src = "50524f5046""#,
        r#"Service: rtsp tcp port 554 src = "525453502f""#,
    ] {
        forest.insert(parse_signature(line).expect("bench signature"));
    }

    c.bench_function("signature_port_tree_find", |b| {
        b.iter(|| {
            let mut best = BestGuess::default();
            black_box(forest.find(
                Protocol::Tcp,
                Direction::Src,
                80,
                black_box(b"GET /index.html HTTP/1.1"),
                &mut best,
            ))
        })
    });
}

criterion_group!(benches, bench_longest_match, bench_signature_lookup);
criterion_main!(benches);
