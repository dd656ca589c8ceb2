//! Observable behavior of emitted bodies: short forms, fresh labels, jump tables.

mod common;

use ilforge_core::asm::assemble;
use ilforge_emit::prelude::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const FOUR_INTS: [TypeRef; 4] = [TypeRef::I32, TypeRef::I32, TypeRef::I32, TypeRef::I32];

fn four_args() -> Vec<Value> { vec![Value::I32(10), Value::I32(11), Value::I32(12), Value::I32(13)] }

/// Four `int32` locals; stores `value` into local `index` and loads it back.
fn store_and_load(il: &mut Il<'_>, compact: bool, index: u16, value: i32) {
    for _ in 0..4 {
        il.declare_local_of::<i32>();
    }
    if compact {
        il.ldc_i4_x(value).stloc_x(index).ldloc_x(index).ret();
    } else {
        il.ldc_i4(value).stloc(index).ldloc(index).ret();
    }
}

proptest! {
    #[test]
    fn compact_arg_loads_match_indexed_loads(index in 0u16..4) {
        let compact = common::static_method(TypeRef::I32, &FOUR_INTS, |il| { il.ldarg_x(index).ret(); }).expect("compact");
        let general = common::static_method(TypeRef::I32, &FOUR_INTS, |il| { il.ldarg(index).ret(); }).expect("general");
        let a = compact.invoke_static("Run", &four_args()).expect("run compact");
        let b = general.invoke_static("Run", &four_args()).expect("run general");
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a, Value::I32(10 + i32::from(index)));
        prop_assert!(common::code_size(&compact) < common::code_size(&general));
    }

    #[test]
    fn compact_arg_stores_match_indexed_stores(index in 0u16..4) {
        let compact = common::static_method(TypeRef::I32, &FOUR_INTS, |il| {
            il.ldc_i4_x(77).starg_x(index).ldarg_x(index).ret();
        }).expect("compact");
        let general = common::static_method(TypeRef::I32, &FOUR_INTS, |il| {
            il.ldc_i4(77).starg(index).ldarg(index).ret();
        }).expect("general");
        let a = compact.invoke_static("Run", &four_args()).expect("run compact");
        prop_assert_eq!(&a, &general.invoke_static("Run", &four_args()).expect("run general"));
        prop_assert_eq!(a, Value::I32(77));
    }

    #[test]
    fn compact_local_forms_match_indexed_forms(index in 0u16..4, value in any::<i32>()) {
        let compact = common::static_method(TypeRef::I32, &[], |il| store_and_load(il, true, index, value)).expect("compact");
        let general = common::static_method(TypeRef::I32, &[], |il| store_and_load(il, false, index, value)).expect("general");
        let a = compact.invoke_static("Run", &[]).expect("run compact");
        prop_assert_eq!(&a, &general.invoke_static("Run", &[]).expect("run general"));
        prop_assert_eq!(a, Value::I32(value));
        prop_assert!(common::code_size(&compact) < common::code_size(&general));
    }

    #[test]
    fn compact_constants_match_general_constants(value in -1i32..=8) {
        let compact = common::static_method(TypeRef::I32, &[], |il| { il.ldc_i4_x(value).ret(); }).expect("compact");
        let general = common::static_method(TypeRef::I32, &[], |il| { il.ldc_i4(value).ret(); }).expect("general");
        let a = compact.invoke_static("Run", &[]).expect("run compact");
        prop_assert_eq!(&a, &general.invoke_static("Run", &[]).expect("run general"));
        prop_assert_eq!(a, Value::I32(value));
        prop_assert_eq!(common::code_size(&compact), 2);
        prop_assert_eq!(common::code_size(&general), 6);
    }

    #[test]
    fn any_constant_round_trips_through_the_selector(value in any::<i32>()) {
        let out = common::run(TypeRef::I32, &[], &[], |il| { il.ldc_i4_x(value).ret(); }).expect("run");
        prop_assert_eq!(out, Value::I32(value));
    }
}

#[test]
fn forward_branch_skips_the_side_effect() {
    let out = common::run(TypeRef::I32, &[], &[], |il| {
        let (il, counter) = il.declare_local_of::<i32>();
        il.ldc_i4_0().stloc_local(counter);
        let (il, done) = il.branch_fresh(Il::br_s);
        il.ldc_i4_s(99).stloc_local(counter);
        il.mark_label(done).ldloc_local(counter).ret();
    })
    .expect("run");
    assert_eq!(out, Value::I32(0));
}

#[test]
fn conditional_fresh_branch_takes_both_paths() {
    let ty = common::static_method(TypeRef::I32, &[TypeRef::I32], |il| {
        let (il, negative) = il.ldarg_0().ldc_i4_0().branch_fresh(Il::blt);
        il.ldc_i4_1().ret();
        il.mark_label(negative).ldc_i4_m1().ret();
    })
    .expect("type");
    assert_eq!(ty.invoke_static("Run", &[Value::I32(5)]).expect("positive"), Value::I32(1));
    assert_eq!(ty.invoke_static("Run", &[Value::I32(-5)]).expect("negative"), Value::I32(-1));
}

#[test]
fn jump_table_dispatches_on_selector() {
    let ty = common::static_method(TypeRef::I32, &[TypeRef::I32], |il| {
        let (il, [l0, l1, l2]) = il.ldarg_0().switch_fresh::<3>();
        il.ldc_i4_m1().ret();
        il.mark_label(l0).ldc_i4_s(10).ret();
        il.mark_label(l1).ldc_i4_s(20).ret();
        il.mark_label(l2).ldc_i4_s(30).ret();
    })
    .expect("type");
    let run = |selector: i32| ty.invoke_static("Run", &[Value::I32(selector)]).expect("run");
    assert_eq!(run(1), Value::I32(20));
    assert_eq!(run(0), Value::I32(10));
    assert_eq!(run(2), Value::I32(30));
    assert_eq!(run(3), Value::I32(-1));
    assert_eq!(run(-1), Value::I32(-1));
}

#[test]
fn explicit_jump_table_keeps_supplied_order() {
    let ty = common::static_method(TypeRef::I32, &[TypeRef::I32], |il| {
        let a = il.define_label();
        let b = il.define_label();
        il.ldarg_0().switch(&[b, a]).ldc_i4_0().ret();
        il.mark_label(a).ldc_i4_1().ret();
        il.mark_label(b).ldc_i4_2().ret();
    })
    .expect("type");
    assert_eq!(ty.invoke_static("Run", &[Value::I32(0)]).expect("run"), Value::I32(2));
    assert_eq!(ty.invoke_static("Run", &[Value::I32(1)]).expect("run"), Value::I32(1));
}

#[test]
fn backward_loop_sums_to_n() {
    let ty = common::static_method(TypeRef::I32, &[TypeRef::I32], |il| {
        let (il, sum) = il.declare_local_of::<i32>();
        let (il, top) = il.ldc_i4_0().stloc_local(sum).mark_fresh_label();
        let (il, done) = il.ldarg_0().branch_fresh(Il::brfalse_s);
        il.ldloc_local(sum).ldarg_0().add().stloc_local(sum);
        il.ldarg_0().ldc_i4_1().sub().starg_x(0).br_s(top);
        il.mark_label(done).ldloc_local(sum).ret();
    })
    .expect("type");
    assert_eq!(ty.invoke_static("Run", &[Value::I32(10)]).expect("run"), Value::I32(55));
    assert_eq!(ty.invoke_static("Run", &[Value::I32(0)]).expect("run"), Value::I32(0));
}

#[test]
fn checked_arithmetic_and_conversions() {
    let ty = common::static_method(TypeRef::I32, &[TypeRef::I32, TypeRef::I32], |il| {
        il.ldarg_0().ldarg_1().add_ovf().ret();
    })
    .expect("type");
    assert_eq!(ty.invoke_static("Run", &[Value::I32(2), Value::I32(3)]).expect("run"), Value::I32(5));
    assert!(matches!(
        ty.invoke_static("Run", &[Value::I32(i32::MAX), Value::I32(1)]),
        Err(HostError::Exec(ExecError::Overflow))
    ));

    let out = common::run(TypeRef::I32, &[], &[], |il| {
        il.ldc_i4(300).conv_u1().ret();
    })
    .expect("conv");
    assert_eq!(out, Value::I32(44));

    let out = common::run(TypeRef::F64, &[], &[], |il| {
        il.ldc_i4_x(7).conv_r8().ldc_r8(0.5).mul().ret();
    })
    .expect("float");
    assert_eq!(out, Value::F64(3.5));
}

#[test]
fn arrays_and_boxing() {
    let out = common::run(TypeRef::I32, &[], &[], |il| {
        let (il, arr) = il.declare_local(TypeRef::array_of(TypeRef::I32));
        il.ldc_i4_3().newarr_of::<i32>().stloc_local(arr);
        il.ldloc_local(arr).ldc_i4_1().ldc_i4_s(40).stelem_i4();
        il.ldloc_local(arr).ldc_i4_1().ldelem_i4();
        il.ldloc_local(arr).ldlen().conv_i4().add();
        il.box_of::<i32>().unbox_any_of::<i32>().ret();
    })
    .expect("run");
    assert_eq!(out, Value::I32(43));
}

#[test]
fn assembled_listing_with_labels_executes() {
    let source = "
        ; absolute value
            ldarg.0
            ldc.i4.0
            bge.s positive
            ldarg.0
            neg
            ret
        positive:
            ldarg.0
            ret
    ";
    let body = assemble(source).expect("assemble");
    let module = common::module("Listing");
    let mut tb = module.define_public_class("Abs", None, &[]).expect("class");
    let attrs = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
    let id = tb.define_method("Run", attrs, TypeRef::I32, [TypeRef::I32]).expect("method");
    tb.set_method_body(id, body).expect("body");
    let ty = tb.create_type().expect("create");
    assert_eq!(ty.invoke_static("Run", &[Value::I32(-12)]).expect("run"), Value::I32(12));
    assert_eq!(ty.invoke_static("Run", &[Value::I32(12)]).expect("run"), Value::I32(12));
}

#[test]
fn step_limit_stops_runaway_loops() {
    let mut asm = AssemblyBuilder::define_dynamic_assembly(AssemblyName::new("Spin"), AssemblyAccess::Run);
    let module = asm.define_dynamic_module_with("Spin", HostOptions::default().with_max_steps(1_000)).expect("module");
    let mut tb = module.define_public_class("Spin", None, &[]).expect("class");
    let attrs = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
    let id = tb.define_method("Run", attrs, TypeRef::Void, Vec::new()).expect("method");
    let mut il = Il::new(tb.method_body_mut(id).expect("body"));
    let (il, top) = il.mark_fresh_label();
    il.nop().br_s(top);
    let ty = tb.create_type().expect("create");
    assert!(matches!(ty.invoke_static("Run", &[]), Err(HostError::Exec(ExecError::StepLimit(1_000)))));
}
