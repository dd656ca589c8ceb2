//! Override binding, end to end through materialization and dispatch.

mod common;

use ilforge_core::EmitError;
use ilforge_emit::prelude::*;
use pretty_assertions::assert_eq;

contract! {
    /// Arithmétique de démonstration.
    pub IBasicTests {
        fn SquareTimesTwo(i32) -> i32;
    }
}

contract! {
    /// Une action par arité.
    pub IActions {
        fn A0();
        fn A1(i32);
        fn A2(i32, i64);
        fn A3(i32, i64, f64);
    }
}

contract! {
    /// Deux fonctions indépendantes.
    pub IPair {
        fn First(i32) -> i32;
        fn Second(i32, i32) -> i32;
        fn Third(i32, i32, i32) -> i32;
        fn Zero() -> i64;
    }
}

#[test]
fn emitted_method_works_just_fine() {
    let ty = AssemblyName::new("Tests")
        .define_dynamic_assembly()
        .define_dynamic_module("Tests")
        .expect("module")
        .define_public_class("BasicTests", None, &[IBasicTests::contract()])
        .expect("class")
        .define_func_override1::<IBasicTests, i32, i32>("SquareTimesTwo", |il| {
            il.ldarg_1().dup().mul().ldc_i4_2().mul().ret();
        })
        .expect("override")
        .create_type()
        .expect("create");

    let tests = ty.instantiate().expect("instance");
    for (input, expected) in [(9, 162), (0, 0), (-3, 18)] {
        let out = tests.invoke::<IBasicTests>("SquareTimesTwo", &[Value::I32(input)]).expect("invoke");
        assert_eq!(out, Value::I32(expected), "input {input}");
    }
}

#[test]
fn action_overrides_of_every_arity_return() {
    let module = common::module("Actions");
    let mut tb = module.define_public_class("Actions", None, &[IActions::contract()]).expect("class");
    tb.define_action_override::<IActions>("A0", |il| {
        il.ret();
    })
    .and_then(|tb| {
        tb.define_action_override1::<IActions, i32>("A1", |il| {
            il.ret();
        })
    })
    .and_then(|tb| {
        tb.define_action_override2::<IActions, i32, i64>("A2", |il| {
            il.ret();
        })
    })
    .and_then(|tb| {
        tb.define_action_override3::<IActions, i32, i64, f64>("A3", |il| {
            il.ret();
        })
    })
    .expect("overrides");
    let obj = tb.create_type().and_then(|ty| ty.instantiate()).expect("instance");

    assert_eq!(obj.invoke::<IActions>("A0", &[]).expect("A0"), Value::Void);
    assert_eq!(obj.invoke::<IActions>("A1", &[Value::I32(1)]).expect("A1"), Value::Void);
    assert_eq!(obj.invoke::<IActions>("A2", &[Value::I32(1), Value::I64(2)]).expect("A2"), Value::Void);
    let args = [Value::I32(1), Value::I64(2), Value::F64(3.0)];
    assert_eq!(obj.invoke::<IActions>("A3", &args).expect("A3"), Value::Void);
}

#[test]
fn func_overrides_dispatch_independently() {
    let module = common::module("Pair");
    let mut tb = module.define_public_class("Pair", None, &[IPair::contract()]).expect("class");
    tb.define_func_override1::<IPair, i32, i32>("First", |il| {
        il.ldarg_1().ldc_i4_1().add().ret();
    })
    .expect("first")
    .define_func_override2::<IPair, i32, i32, i32>("Second", |il| {
        il.ldarg_1().ldarg_2().sub().ret();
    })
    .expect("second")
    .define_func_override3::<IPair, i32, i32, i32, i32>("Third", |il| {
        il.ldarg_1().ldarg_2().mul().ldarg_3().add().ret();
    })
    .expect("third")
    .define_func_override::<IPair, i64>("Zero", |il| {
        il.ldc_i8(0).ret();
    })
    .expect("zero");
    let obj = tb.create_type().and_then(|ty| ty.instantiate()).expect("instance");

    assert_eq!(obj.invoke::<IPair>("First", &[Value::I32(41)]).expect("first"), Value::I32(42));
    assert_eq!(obj.invoke::<IPair>("Second", &[Value::I32(10), Value::I32(3)]).expect("second"), Value::I32(7));
    let args = [Value::I32(6), Value::I32(7), Value::I32(8)];
    assert_eq!(obj.invoke::<IPair>("Third", &args).expect("third"), Value::I32(50));
    assert_eq!(obj.invoke::<IPair>("Zero", &[]).expect("zero"), Value::I64(0));
}

#[test]
fn dynamic_form_accepts_runtime_contracts() {
    let contract = Contract::builder("IGreeter").member("Greet", TypeRef::String, Vec::new()).build();
    let module = common::module("Dynamic");
    let mut tb = module.define_public_class("Greeter", None, &[contract.clone()]).expect("class");
    tb.define_override(&contract, "Greet", TypeRef::String, &[], |il| {
        il.ldstr("hello").ret();
    })
    .expect("override");
    let obj = tb.create_type().and_then(|ty| ty.instantiate()).expect("instance");
    let member = contract.resolve_member("Greet", &[]).expect("member");
    assert_eq!(obj.invoke_member(&contract, member, &[]).expect("greet"), Value::from("hello"));
}

#[test]
fn lookup_failure_leaves_the_builder_usable() {
    let module = common::module("Lookup");
    let mut tb = module.define_public_class("BasicTests", None, &[IBasicTests::contract()]).expect("class");

    let err = tb
        .define_func_override1::<IBasicTests, i32, i64>("SquareTimesTwo", |il| {
            il.ret();
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "contract `IBasicTests` has no member `SquareTimesTwo(int64)`");
    let err = tb
        .define_func_override1::<IBasicTests, i32, i32>("SquareTimesThree", |il| {
            il.ret();
        })
        .unwrap_err();
    assert!(matches!(err, HostError::MemberNotFound { .. }));
    assert!(!tb.has_method("SquareTimesTwo", &[TypeRef::I64]));
    assert!(!tb.has_method("SquareTimesThree", &[TypeRef::I32]));

    tb.define_func_override1::<IBasicTests, i32, i32>("SquareTimesTwo", |il| {
        il.ldarg_1().ret();
    })
    .expect("retry");
    let obj = tb.create_type().and_then(|ty| ty.instantiate()).expect("instance");
    assert_eq!(obj.invoke::<IBasicTests>("SquareTimesTwo", &[Value::I32(5)]).expect("invoke"), Value::I32(5));
}

#[test]
fn unbound_label_names_the_method() {
    let module = common::module("Labels");
    let mut tb = module.define_public_class("BasicTests", None, &[IBasicTests::contract()]).expect("class");
    let err = tb
        .define_func_override1::<IBasicTests, i32, i32>("SquareTimesTwo", |il| {
            let (il, _never) = il.ldarg_1().branch_fresh(Il::brtrue_s);
            il.ldc_i4_0().ret();
        })
        .unwrap_err();

    let HostError::InvalidBody { ty, method, source } = err else { panic!("expected an invalid body error") };
    assert_eq!((ty.as_str(), method.as_str()), ("BasicTests", "SquareTimesTwo"));
    assert!(matches!(source, ilforge_core::CoreError::Emit(EmitError::UnboundLabel { first_use: Some(1), .. })));
    assert!(!tb.has_method("SquareTimesTwo", &[TypeRef::I32]));
    assert!(!tb.is_slot_bound("IBasicTests", 0));

    tb.define_func_override1::<IBasicTests, i32, i32>("SquareTimesTwo", |il| {
        il.ldarg_1().dup().mul().ldc_i4_2().mul().ret();
    })
    .expect("retry");
    assert!(tb.has_method("SquareTimesTwo", &[TypeRef::I32]));
    assert!(!tb.has_method("IBasicTests.SquareTimesTwo", &[TypeRef::I32]));
    let obj = tb.create_type().and_then(|ty| ty.instantiate()).expect("instance");
    assert_eq!(obj.invoke::<IBasicTests>("SquareTimesTwo", &[Value::I32(3)]).expect("invoke"), Value::I32(18));
}

#[test]
fn label_misuse_is_reported_at_seal() {
    let mut other = MethodBody::new();
    let foreign = other.define_label();

    let err = common::run(TypeRef::Void, &[], &[], |il| {
        let (il, here) = il.mark_fresh_label();
        il.mark_label(here).ret();
    })
    .unwrap_err();
    assert!(matches!(err, HostError::InvalidBody { source: ilforge_core::CoreError::Emit(EmitError::LabelRebound { .. }), .. }));

    let err = common::run(TypeRef::Void, &[], &[], |il| {
        il.br(foreign).ret();
    })
    .unwrap_err();
    assert!(matches!(err, HostError::InvalidBody { source: ilforge_core::CoreError::Emit(EmitError::ForeignLabel { .. }), .. }));
}

#[test]
fn short_branch_out_of_range_is_rejected() {
    let err = common::run(TypeRef::Void, &[], &[], |il| {
        let (il, far) = il.branch_fresh(Il::br_s);
        for _ in 0..200 {
            il.nop();
        }
        il.mark_label(far).ret();
    })
    .unwrap_err();
    assert!(matches!(
        err,
        HostError::InvalidBody { source: ilforge_core::CoreError::Emit(EmitError::BranchOutOfRange { .. }), .. }
    ));

    let out = common::run(TypeRef::I32, &[], &[], |il| {
        let (il, far) = il.branch_fresh(Il::br);
        for _ in 0..200 {
            il.nop();
        }
        il.mark_label(far).ldc_i4_7().ret();
    })
    .expect("long branch");
    assert_eq!(out, Value::I32(7));
}

#[test]
fn binding_after_materialization_fails() {
    let module = common::module("Late");
    let mut tb = module.define_public_class("BasicTests", None, &[IBasicTests::contract()]).expect("class");
    tb.define_func_override1::<IBasicTests, i32, i32>("SquareTimesTwo", |il| {
        il.ldarg_1().ret();
    })
    .expect("override");
    tb.create_type().expect("create");

    let err = tb
        .define_func_override1::<IBasicTests, i32, i32>("SquareTimesTwo", |il| {
            il.ldarg_1().ret();
        })
        .unwrap_err();
    assert!(matches!(err, HostError::AlreadyMaterialized { .. }));
}

#[test]
fn missing_implementation_fails_create_type() {
    let module = common::module("Missing");
    let mut tb = module.define_public_class("Partial", None, &[IPair::contract()]).expect("class");
    tb.define_func_override1::<IPair, i32, i32>("First", |il| {
        il.ldarg_1().ret();
    })
    .expect("first");
    let err = tb.create_type().unwrap_err();
    assert_eq!(err.to_string(), "type `Partial` does not implement `IPair::Second(int32, int32) -> int32`");
    assert!(!tb.is_materialized());
}

#[test]
fn overrides_call_each_other_through_the_contract() {
    let module = common::module("Calls");
    let contract = IPair::contract();
    let mut tb = module.define_public_class("Chain", None, &[contract.clone()]).expect("class");
    let first = MethodRef::instance(contract.type_ref(), "First", TypeRef::I32, [TypeRef::I32]);
    tb.define_func_override1::<IPair, i32, i32>("First", |il| {
        il.ldarg_1().ldc_i4_x(100).add().ret();
    })
    .expect("first")
    .define_func_override2::<IPair, i32, i32, i32>("Second", |il| {
        il.ldarg_0().ldarg_1().callvirt(&first).ldarg_2().mul().ret();
    })
    .expect("second")
    .define_func_override3::<IPair, i32, i32, i32, i32>("Third", |il| {
        il.ldc_i4_0().ret();
    })
    .expect("third")
    .define_func_override::<IPair, i64>("Zero", |il| {
        il.ldc_i4_0().conv_i8().ret();
    })
    .expect("zero");
    let obj = tb.create_type().and_then(|ty| ty.instantiate()).expect("instance");
    assert_eq!(obj.invoke::<IPair>("Second", &[Value::I32(1), Value::I32(2)]).expect("second"), Value::I32(202));
    assert_eq!(obj.invoke::<IPair>("Zero", &[]).expect("zero"), Value::I64(0));
}
