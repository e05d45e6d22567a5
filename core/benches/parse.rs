//! Parse benchmarks: introspection-time cost.
//!
//! Measures: constraint expressions of growing size, scoped validation tags,
//! access tags, and the expression cache hit path.

use fieldtools::prelude::*;
use fieldtools::ConstraintParser;

fn main() {
    divan::main();
}

const APP_CONFIG: &str = r"required,len(1,3),or($id,regexp('^AppConfig\.[A-Za-z0-9]{9,40}$')),len(1,3)";

fn parser() -> ConstraintParser {
    let mut parser = ConstraintParser::new();
    parser.register("id", fieldtools::parse_constraint("regexp('^[a-z]{2}$')").unwrap());
    parser
}

// ═══════════════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════════════

#[divan::bench]
fn shortcut(bencher: divan::Bencher) {
    let parser = parser();
    bencher.bench_local(|| parser.parse(divan::black_box("required")));
}

#[divan::bench]
fn app_config_expression(bencher: divan::Bencher) {
    let parser = parser();
    bencher.bench_local(|| parser.parse(divan::black_box(APP_CONFIG)));
}

#[divan::bench(args = [1, 4, 16, 64])]
fn wide_and(bencher: divan::Bencher, terms: usize) {
    let parser = parser();
    let expression = vec!["minlen(1)"; terms].join(",");
    bencher.bench_local(|| parser.parse(divan::black_box(&expression)));
}

#[divan::bench(args = [1, 4, 16])]
fn deep_not(bencher: divan::Bencher, depth: usize) {
    let parser = parser();
    let expression = format!("{}required{}", "not(".repeat(depth), ")".repeat(depth));
    bencher.bench_local(|| parser.parse(divan::black_box(&expression)));
}

#[divan::bench]
fn scoped_tag(bencher: divan::Bencher) {
    let parser = parser();
    let tag = "create:required,len(1,64);update:len(0,64);*:notnil";
    bencher.bench_local(|| parser.parse_tag(divan::black_box(tag)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Caches and access tags
// ═══════════════════════════════════════════════════════════════════════════════

#[divan::bench]
fn cached_expression(bencher: divan::Bencher) {
    let catalog = CatalogBuilder::new().build();
    catalog.constraint("required,len(1,64)").unwrap();
    bencher.bench_local(|| catalog.constraint(divan::black_box("required,len(1,64)")));
}

#[divan::bench]
fn access_tag(bencher: divan::Bencher) {
    let catalog = CatalogBuilder::new()
        .register_access_principals(["a", "b", "c", "d", "e", "f", "g"])
        .unwrap()
        .build();
    bencher.bench_local(|| catalog.principals().parse_tag(divan::black_box("rwrcru--r-rw-u,p")));
}
