//! Shared harness: one static method per type, executed by the reference interpreter.

#![allow(dead_code)]

use std::rc::Rc;

use ilforge_emit::prelude::*;

/// New module in a fresh assembly.
pub fn module(name: &str) -> ModuleBuilder {
    let mut asm = AssemblyBuilder::define_dynamic_assembly(AssemblyName::new(name), AssemblyAccess::Run);
    asm.define_dynamic_module(name).expect("module")
}

/// Materializes `Host::Run(params) -> ret` with the body written by `gen`.
pub fn static_method(ret: TypeRef, params: &[TypeRef], gen: impl FnOnce(&mut Il<'_>)) -> HostResult<Rc<RuntimeType>> {
    let module = module("Harness");
    let mut tb = module.define_public_class("Host", None, &[])?;
    let attrs = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
    let id = tb.define_method("Run", attrs, ret, params.to_vec())?;
    gen(&mut Il::new(tb.method_body_mut(id)?));
    tb.create_type()
}

/// Builds and runs `Host::Run` once.
pub fn run(ret: TypeRef, params: &[TypeRef], args: &[Value], gen: impl FnOnce(&mut Il<'_>)) -> HostResult<Value> {
    static_method(ret, params, gen)?.invoke_static("Run", args)
}

/// Encoded size of `Host::Run`.
pub fn code_size(ty: &RuntimeType) -> usize {
    ty.methods().find(|m| m.name() == "Run").map_or(0, |m| m.body().len())
}
