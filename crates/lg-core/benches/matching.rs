//! Matching hot path benchmarks
//!
//! Run with: cargo bench -p lg-core

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use lg_core::{AnchorType, PartyMask, Pattern, RequestContext, RequestType, Rule, RuleAction, RuleFlags, RuleIndex};

fn rule(body: &str, anchor: AnchorType, action: RuleAction) -> Rule {
    Rule {
        action,
        flags: RuleFlags::empty(),
        pattern: Pattern::compile(body, anchor, false, false),
        type_mask: RequestType::empty(),
        party_mask: PartyMask::empty(),
        domain_constraints: None,
    }
}

/// A list shaped like a real one: mostly host rules, some path rules.
fn synthetic_index(hosts: usize, generic: usize) -> RuleIndex {
    let mut rules = Vec::with_capacity(hosts + generic + 1);
    for i in 0..hosts {
        rules.push(rule(&format!("ads{i}.example^"), AnchorType::Hostname, RuleAction::Block));
    }
    for i in 0..generic {
        rules.push(rule(&format!("/banner{i}/*.gif"), AnchorType::None, RuleAction::Block));
    }
    rules.push(rule("ads7.example/allowed.js", AnchorType::Hostname, RuleAction::Allow));
    RuleIndex::build(rules, Vec::new())
}

fn bench_match_request(c: &mut Criterion) {
    let index = synthetic_index(20_000, 500);

    let mut group = c.benchmark_group("match_request");
    group.throughput(Throughput::Elements(1));

    let blocked = RequestContext::new("https://cdn.ads42.example/x.js", Some("https://site.test/"), RequestType::SCRIPT);
    group.bench_function("host_bucket_block", |b| {
        b.iter(|| index.match_request(black_box(&blocked)))
    });

    let excepted = RequestContext::new("https://ads7.example/allowed.js", Some("https://site.test/"), RequestType::SCRIPT);
    group.bench_function("exception", |b| b.iter(|| index.match_request(black_box(&excepted))));

    let clean = RequestContext::new(
        "https://www.site.test/static/app.js?v=123",
        Some("https://www.site.test/"),
        RequestType::SCRIPT,
    );
    group.bench_function("no_match", |b| b.iter(|| index.match_request(black_box(&clean))));

    group.finish();
}

fn bench_context(c: &mut Criterion) {
    c.bench_function("request_context_new", |b| {
        b.iter(|| {
            RequestContext::new(
                black_box("https://a.b.tracker.example.co.uk/pixel.gif?id=1"),
                black_box(Some("https://news.site.test/article")),
                RequestType::IMAGE,
            )
        })
    });
}

criterion_group!(benches, bench_match_request, bench_context);
criterion_main!(benches);
