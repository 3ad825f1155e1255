//! Resolver Operations Benchmarks
//!
//! Benchmarks for selector parsing and host-node resolution over trees of
//! growing size.
//!
//! Run with: `cargo bench --bench resolver_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use treewait::prelude::*;
use treewait::{Selector, SelectorResolver};

fn bench_selector_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_parsing");

    let selectors = vec![
        ("simple_id", "#my-button"),
        ("simple_class", ".btn-primary"),
        ("tag", "button"),
        ("attribute", "[data-spec=\"submit-search\"]"),
        ("child", "ul.events > li[data-spec=\"list-item\"]"),
        ("multiple_classes", ".btn.btn-lg.btn-primary"),
        ("descendant", "form input[type=\"text\"]"),
        ("list", "h1, h2, h3[data-level^=\"sub\"]"),
    ];

    for (name, selector) in selectors {
        group.bench_with_input(BenchmarkId::from_parameter(name), &selector, |bench, sel| {
            bench.iter(|| {
                let parsed = Selector::parse(black_box(sel)).unwrap();
                black_box(parsed);
            });
        });
    }

    group.finish();
}

/// A list of `rows` sections, each wrapped in a composite with five items
fn build_tree(rows: usize) -> VirtualTree {
    let tree = VirtualTree::new();
    let list = tree.append(
        tree.root_id(),
        ElementInfo::host("ul").with_attr("data-spec", "list"),
    );
    for row in 0..rows {
        let wrapper = tree.append(list, ElementInfo::composite("Row"));
        let item = tree.append(
            wrapper,
            ElementInfo::host("li")
                .with_attr("data-spec", "row")
                .with_class(if row % 2 == 0 { "even" } else { "odd" }),
        );
        for cell in 0..5 {
            tree.append(
                item,
                ElementInfo::host("span").with_attr("data-spec", format!("cell-{cell}")),
            );
        }
    }
    tree.update();
    tree
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    for rows in [10, 100, 1000] {
        let tree = build_tree(rows);
        let resolver = SelectorResolver::new(&tree, DEFAULT_SPEC_ATTRIBUTE);

        group.bench_with_input(BenchmarkId::new("by_selector", rows), &rows, |bench, _| {
            bench.iter(|| {
                let nodes = resolver.resolve_by_selector(black_box("li.even > span")).unwrap();
                black_box(nodes);
            });
        });

        group.bench_with_input(BenchmarkId::new("by_spec_id", rows), &rows, |bench, _| {
            bench.iter(|| {
                let nodes = resolver
                    .resolve_by_spec_id(black_box("cell-3"), None, Some("span"))
                    .unwrap();
                black_box(nodes);
            });
        });

        group.bench_with_input(BenchmarkId::new("by_spec_path", rows), &rows, |bench, _| {
            bench.iter(|| {
                let nodes = resolver
                    .resolve_by_spec_path(black_box(&["list", "row", "cell-0"]), None, None)
                    .unwrap();
                black_box(nodes);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_selector_parsing, bench_resolution);
criterion_main!(benches);
