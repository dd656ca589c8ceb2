//! emit_run.rs — matérialisation d'un override puis exécution sur l'interpréteur de référence.
//!
//! Lancer :
//!   cargo bench -p ilforge-benches --bench emit_run

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ilforge_benches::sum_loop;
use ilforge_emit::prelude::*;

contract! {
    /// Contrat mesuré.
    pub ISquare {
        fn SquareTimesTwo(i32) -> i32;
    }
}

fn square_type() -> HostResult<Rc<RuntimeType>> {
    AssemblyName::new("Bench")
        .define_dynamic_assembly()
        .define_dynamic_module("Bench")?
        .define_public_class("Square", None, &[ISquare::contract()])?
        .define_func_override1::<ISquare, i32, i32>("SquareTimesTwo", |il| {
            il.ldarg_1().dup().mul().ldc_i4_2().mul().ret();
        })?
        .create_type()
}

fn sum_type() -> HostResult<Rc<RuntimeType>> {
    let mut asm = AssemblyBuilder::define_dynamic_assembly(AssemblyName::new("Bench"), AssemblyAccess::Run);
    let module = asm.define_dynamic_module("Bench")?;
    let mut tb = module.define_public_class("Sum", None, &[])?;
    let id = tb.define_method(
        "Run",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        TypeRef::I32,
        vec![TypeRef::I32],
    )?;
    sum_loop(&mut Il::new(tb.method_body_mut(id)?));
    tb.create_type()
}

fn bench_materialize(c: &mut Criterion) {
    c.bench_function("emit+create_type/override", |b| {
        b.iter(|| black_box(square_type()));
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let Ok(obj) = square_type().and_then(|ty| ty.instantiate()) else { return };
    c.bench_function("run/contract_dispatch", |b| {
        b.iter(|| black_box(obj.invoke::<ISquare>("SquareTimesTwo", &[Value::I32(black_box(9))])));
    });
}

fn bench_loop(c: &mut Criterion) {
    let Ok(ty) = sum_type() else { return };
    let mut group = c.benchmark_group("run/sum_loop");
    for n in [10, 1_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(ty.invoke_static("Run", &[Value::I32(n)])));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_materialize, bench_dispatch, bench_loop);
criterion_main!(benches);
