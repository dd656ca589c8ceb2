//! Dynamic assemblies and modules.
//!
//! An assembly groups modules; a module owns type names, registered natives
//! and the [`HostOptions`] its types execute with.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use ilforge_core::Ident;

use crate::contract::Contract;
use crate::error::{ExecResult, HostError, HostResult};
use crate::options::HostOptions;
use crate::runtime::RuntimeType;
use crate::types::{TypeAttributes, TypeBuilder};
use crate::value::Value;

/// Host function callable from IL as `Owner::name` when no emitted method matches.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> ExecResult<Value>>;

/// Assembly identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssemblyName {
    /// Simple name.
    pub name: String,
    /// `major.minor.build.revision`.
    pub version: [u16; 4],
}

impl AssemblyName {
    /// Name with version `0.0.0.0`.
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), version: [0; 4] } }

    /// Sets the version.
    pub const fn with_version(mut self, version: [u16; 4]) -> Self {
        self.version = version;
        self
    }
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.version;
        write!(f, "{}, Version={a}.{b}.{c}.{d}", self.name)
    }
}

/// Lifetime policy of a dynamic assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AssemblyAccess {
    /// Kept alive as long as the builder.
    #[default]
    Run,
    /// Types are released once no handle refers to them.
    RunAndCollect,
}

/// A dynamic assembly.
#[derive(Debug)]
pub struct AssemblyBuilder {
    name: AssemblyName,
    access: AssemblyAccess,
    modules: IndexMap<Ident, ModuleBuilder>,
}

impl AssemblyBuilder {
    /// Creates an empty assembly.
    pub fn define_dynamic_assembly(name: AssemblyName, access: AssemblyAccess) -> Self {
        debug!(assembly = %name, ?access, "define assembly");
        Self { name, access, modules: IndexMap::new() }
    }

    /// Assembly identity.
    pub const fn name(&self) -> &AssemblyName { &self.name }

    /// Lifetime policy.
    pub const fn access(&self) -> AssemblyAccess { self.access }

    /// Adds a module with default options.
    pub fn define_dynamic_module(&mut self, name: impl Into<Ident>) -> HostResult<ModuleBuilder> {
        self.define_dynamic_module_with(name, HostOptions::default())
    }

    /// Adds a module.
    pub fn define_dynamic_module_with(&mut self, name: impl Into<Ident>, options: HostOptions) -> HostResult<ModuleBuilder> {
        let name = name.into();
        if self.modules.contains_key(&name) {
            return Err(HostError::DuplicateModule(name));
        }
        debug!(assembly = %self.name.name, module = %name, "define module");
        let module = ModuleBuilder(Rc::new(ModuleInner {
            name: name.clone(),
            options,
            types: RefCell::new(IndexMap::new()),
            reserved: RefCell::new(IndexSet::new()),
            natives: RefCell::new(IndexMap::new()),
        }));
        self.modules.insert(name, module.clone());
        Ok(module)
    }

    /// Module by name.
    pub fn get_dynamic_module(&self, name: &str) -> Option<ModuleBuilder> { self.modules.get(name).cloned() }

    /// Modules in definition order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleBuilder> { self.modules.values() }
}

/// Shared module state, reachable from every type built in the module.
pub(crate) struct ModuleInner {
    pub(crate) name: Ident,
    pub(crate) options: HostOptions,
    /// Materialized types. Weak so a type and its module do not keep each other alive.
    types: RefCell<IndexMap<Ident, Weak<RuntimeType>>>,
    /// Names handed out by `define_type`, materialized or not.
    reserved: RefCell<IndexSet<Ident>>,
    natives: RefCell<IndexMap<String, NativeFn>>,
}

impl fmt::Debug for ModuleInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInner")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("types", &self.reserved.borrow())
            .field("natives", &self.natives.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleInner {
    /// Materialized type by name, if still alive.
    pub(crate) fn resolve_type(&self, name: &str) -> Option<Rc<RuntimeType>> {
        self.types.borrow().get(name)?.upgrade()
    }

    pub(crate) fn native(&self, key: &str) -> Option<NativeFn> { self.natives.borrow().get(key).cloned() }

    pub(crate) fn register(&self, ty: &Rc<RuntimeType>) {
        self.types.borrow_mut().insert(ty.name().to_owned(), Rc::downgrade(ty));
    }
}

/// A dynamic module. Cheap to clone; clones share the same module.
#[derive(Debug, Clone)]
pub struct ModuleBuilder(Rc<ModuleInner>);

impl ModuleBuilder {
    /// Module name.
    pub fn name(&self) -> &str { &self.0.name }

    /// Execution options for types of this module.
    pub fn options(&self) -> &HostOptions { &self.0.options }

    /// Starts a new type.
    pub fn define_type(
        &self,
        name: impl Into<Ident>,
        attrs: TypeAttributes,
        parent: Option<Rc<RuntimeType>>,
        contracts: &[Arc<Contract>],
    ) -> HostResult<TypeBuilder> {
        let name = name.into();
        if !self.0.reserved.borrow_mut().insert(name.clone()) {
            return Err(HostError::DuplicateType(name));
        }
        debug!(module = %self.0.name, ty = %name, parent = parent.as_ref().map(|p| p.name()), "define type");
        Ok(TypeBuilder::new(Rc::clone(&self.0), name, attrs, parent, contracts.to_vec()))
    }

    /// Starts a public class (`PUBLIC | AUTO_CLASS | BEFORE_FIELD_INIT`).
    pub fn define_public_class(
        &self,
        name: impl Into<Ident>,
        parent: Option<Rc<RuntimeType>>,
        contracts: &[Arc<Contract>],
    ) -> HostResult<TypeBuilder> {
        self.define_type(name, TypeAttributes::PUBLIC_CLASS, parent, contracts)
    }

    /// Materialized type by name.
    pub fn get_type(&self, name: &str) -> Option<Rc<RuntimeType>> { self.0.resolve_type(name) }

    /// Names of every type defined so far, in definition order.
    pub fn type_names(&self) -> Vec<Ident> { self.0.reserved.borrow().iter().cloned().collect() }

    /// Registers a host function reachable as `owner::name` from `call`.
    pub fn register_native<F>(&self, owner: &str, name: &str, f: F)
    where
        F: Fn(&[Value]) -> ExecResult<Value> + 'static,
    {
        let key = format!("{owner}::{name}");
        debug!(module = %self.0.name, native = %key, "register native");
        self.0.natives.borrow_mut().insert(key, Rc::new(f));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MethodAttributes;
    use ilforge_core::{MethodRef, OpCode, Operand, TypeRef};
    use pretty_assertions::assert_eq;

    fn assembly() -> AssemblyBuilder {
        AssemblyBuilder::define_dynamic_assembly(AssemblyName::new("Dyn").with_version([1, 2, 0, 0]), AssemblyAccess::Run)
    }

    #[test]
    fn names_are_unique() {
        let mut asm = assembly();
        assert_eq!(asm.name().to_string(), "Dyn, Version=1.2.0.0");
        let module = asm.define_dynamic_module("Main").expect("module");
        assert!(matches!(asm.define_dynamic_module("Main"), Err(HostError::DuplicateModule(_))));
        assert_eq!(asm.get_dynamic_module("Main").map(|m| m.name().to_owned()), Some("Main".to_owned()));

        let _a = module.define_public_class("A", None, &[]).expect("A");
        assert!(matches!(module.define_public_class("A", None, &[]), Err(HostError::DuplicateType(_))));
        assert_eq!(module.type_names(), vec!["A".to_owned()]);
        assert!(module.get_type("A").is_none());
    }

    #[test]
    fn materialized_types_are_registered_weakly() {
        let mut asm = assembly();
        let module = asm.define_dynamic_module("Main").expect("module");
        let mut tb = module.define_public_class("Temp", None, &[]).expect("type");
        let ty = tb.create_type().expect("create");
        assert_eq!(module.get_type("Temp").map(|t| t.module_name().to_owned()), Some("Main".to_owned()));
        drop(ty);
        assert!(module.get_type("Temp").is_none());
    }

    #[test]
    fn natives_are_reachable_from_il() {
        let mut asm = assembly();
        let module = asm.define_dynamic_module("Main").expect("module");
        module.register_native("Math", "Twice", |args| {
            let n = i32::try_from(args[0].clone())?;
            Ok(Value::I32(n * 2))
        });

        let mut tb = module.define_public_class("Prog", None, &[]).expect("type");
        let attrs = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
        let m = tb.define_method("Run", attrs, TypeRef::I32, [TypeRef::I32]).expect("method");
        let body = tb.method_body_mut(m).expect("body");
        body.emit(OpCode::Ldarg_0, Operand::None);
        let twice = MethodRef::new_static(TypeRef::named("Math"), "Twice", TypeRef::I32, [TypeRef::I32]);
        body.emit(OpCode::Call, Operand::Method(twice));
        body.emit(OpCode::Ret, Operand::None);
        let ty = tb.create_type().expect("create");
        assert_eq!(ty.invoke_static("Run", &[Value::I32(21)]).expect("run"), Value::I32(42));
    }
}
