use criterion::{black_box, criterion_group, criterion_main, Criterion};

use harrow::evaluator::{Evaluator, ThreadPoolEval};
use harrow::montgomery::{m_mul, Montgomery};
use harrow::primality::{is_prime, is_strong_2prp};
use harrow::primegen::segment_candidates;
use harrow::products::ProductTable;
use harrow::Mode;

fn bench_m_mul_chain(c: &mut Criterion) {
    let p = 18446744073709551557u64;
    let ctx = Montgomery::new(p);
    c.bench_function("m_mul chain x1024", |b| {
        b.iter(|| {
            let mut acc = ctx.to_mont(black_box(123456789));
            for _ in 0..1024 {
                acc = m_mul(acc, acc, ctx.p, ctx.q);
            }
            acc
        });
    });
}

fn bench_is_prime_large(c: &mut Criterion) {
    c.bench_function("is_prime(2^64 - 59)", |b| {
        b.iter(|| is_prime(black_box(18446744073709551557)));
    });
}

fn bench_strong_2prp(c: &mut Criterion) {
    c.bench_function("is_strong_2prp(10^12 + 39)", |b| {
        b.iter(|| is_strong_2prp(black_box(1_000_000_000_039)));
    });
}

fn bench_segment_generation(c: &mut Criterion) {
    c.bench_function("segment_candidates(10^9, 10^9 + 10^5)", |b| {
        b.iter(|| segment_candidates(black_box(1_000_000_000), black_box(1_000_100_000)));
    });
}

fn bench_table_build(c: &mut Criterion) {
    c.bench_function("ProductTable::build(factorial, 10^6)", |b| {
        b.iter(|| ProductTable::build(Mode::Factorial, black_box(1_000_000), 1_100_000));
    });
}

fn bench_iterate_window(c: &mut Criterion) {
    let table = ProductTable::build(Mode::Factorial, 1_000_000, 1_010_000);
    let window = segment_candidates(1_000_000_000, 1_000_200_000);
    c.bench_function("iterate 10k steps over ~10k candidates", |b| {
        b.iter(|| {
            let mut ev = ThreadPoolEval::new(Mode::Factorial, &table, 1 << 16);
            ev.load(&window);
            ev.setup(0, table.entries.len());
            ev.iterate(1_000_000, 1_010_000, 0);
            ev.check(1_009_999);
            ev.drain().checksum
        });
    });
}

criterion_group!(
    benches,
    bench_m_mul_chain,
    bench_is_prime_large,
    bench_strong_2prp,
    bench_segment_generation,
    bench_table_build,
    bench_iterate_window,
);
criterion_main!(benches);
