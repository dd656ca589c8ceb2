//! emit_seal.rs — coût de l'émission fluide puis du scellement (résolution des labels).
//!
//! Lancer :
//!   cargo bench -p ilforge-benches --bench emit_seal
//!   cargo bench -p ilforge-benches --bench emit_seal -- --save-baseline seal

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ilforge_benches::{jump_table, sum_loop};
use ilforge_core::MethodBody;
use ilforge_emit::Il;

fn bench_sum_loop(c: &mut Criterion) {
    c.bench_function("emit+seal/sum_loop", |b| {
        b.iter(|| {
            let mut body = MethodBody::new();
            sum_loop(&mut Il::new(&mut body));
            black_box(body.seal())
        });
    });
}

fn bench_jump_tables(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit+seal/jump_table");
    for cases in [4usize, 64, 512] {
        group.throughput(Throughput::Elements(cases as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cases), &cases, |b, &cases| {
            b.iter(|| {
                let mut body = MethodBody::new();
                jump_table(&mut Il::new(&mut body), cases);
                black_box(body.seal())
            });
        });
    }
    group.finish();
}

fn bench_straight_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit+seal/constants");
    for count in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut body = MethodBody::new();
                let mut il = Il::new(&mut body);
                for i in 0..count {
                    il.ldc_i4_x(i32::try_from(i).unwrap_or(i32::MAX)).pop();
                }
                il.ret();
                black_box(body.seal())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sum_loop, bench_jump_tables, bench_straight_line);
criterion_main!(benches);
