//! Type construction: attributes, method/field declaration, override
//! binding and materialization.

use std::rc::Rc;
use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;
use tracing::debug;

use ilforge_core::helpers::validate_body;
use ilforge_core::meta::CTOR_NAME;
use ilforge_core::{CoreError, FieldRef, Ident, MethodBody, SealedBody, Signature, TypeRef};

use crate::assembly::ModuleInner;
use crate::contract::{Contract, ContractMember};
use crate::error::{HostError, HostResult};
use crate::runtime::{RuntimeMethod, RuntimeType};
use crate::value::Value;

bitflags! {
    /// Type attributes (ECMA-335 `TypeAttributes` values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeAttributes: u32 {
        /// Visible outside the assembly.
        const PUBLIC            = 0x0000_0001;
        /// Interface rather than class.
        const INTERFACE         = 0x0000_0020;
        /// Cannot be instantiated.
        const ABSTRACT          = 0x0000_0080;
        /// Cannot be derived from.
        const SEALED            = 0x0000_0100;
        /// Name is special.
        const SPECIAL_NAME      = 0x0000_0400;
        /// Serializable.
        const SERIALIZABLE      = 0x0000_2000;
        /// String marshalling chosen by the host.
        const AUTO_CLASS        = 0x0002_0000;
        /// Static initialization may run before first static field access.
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

bitflags! {
    /// Method attributes (ECMA-335 `MethodAttributes` values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAttributes: u32 {
        /// Visible to the declaring type only.
        const PRIVATE        = 0x0001;
        /// Visible everywhere.
        const PUBLIC         = 0x0006;
        /// No `this`.
        const STATIC         = 0x0010;
        /// Cannot be overridden.
        const FINAL          = 0x0020;
        /// Dispatched through the receiver's type.
        const VIRTUAL        = 0x0040;
        /// Hidden by name and signature.
        const HIDE_BY_SIG    = 0x0080;
        /// Always gets a new virtual slot.
        const NEW_SLOT       = 0x0100;
        /// No body.
        const ABSTRACT       = 0x0400;
        /// Name is special.
        const SPECIAL_NAME   = 0x0800;
        /// Name is special to the runtime (`.ctor`).
        const RT_SPECIAL_NAME = 0x1000;
    }
}

impl TypeAttributes {
    /// Attributes of `define_public_class`.
    pub const PUBLIC_CLASS: Self = Self::PUBLIC.union(Self::AUTO_CLASS).union(Self::BEFORE_FIELD_INIT);
}

impl MethodAttributes {
    /// Attributes given to contract implementations.
    pub const OVERRIDE: Self = Self::PUBLIC.union(Self::VIRTUAL).union(Self::HIDE_BY_SIG).union(Self::NEW_SLOT);
}

/// Handle to a method declared on a [`TypeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(usize);

impl MethodId {
    /// Declaration index.
    pub const fn index(self) -> usize { self.0 }
}

#[derive(Debug)]
enum BodyState {
    Open(MethodBody),
    Sealed(SealedBody),
    Invalid(CoreError),
}

impl BodyState {
    /// Seals an open body in place; sealing twice is a no-op.
    fn seal(&mut self) -> Result<&SealedBody, CoreError> {
        if let BodyState::Open(body) = self {
            let body = std::mem::take(body);
            *self = match body.seal() {
                Ok(sealed) => BodyState::Sealed(sealed),
                Err(err) => BodyState::Invalid(err.into()),
            };
        }
        match self {
            BodyState::Sealed(sealed) => Ok(sealed),
            BodyState::Invalid(err) => Err(err.clone()),
            BodyState::Open(_) => Err(CoreError::corrupted("body still open after sealing")),
        }
    }
}

#[derive(Debug)]
struct MethodDef {
    name: Ident,
    attrs: MethodAttributes,
    sig: Signature,
    body: BodyState,
}

impl MethodDef {
    const fn has_this(&self) -> bool { !self.attrs.contains(MethodAttributes::STATIC) }
}

/// A type under construction.
///
/// Owned by the caller until [`create_type`](Self::create_type); afterwards
/// every mutating call fails with [`HostError::AlreadyMaterialized`].
#[derive(Debug)]
pub struct TypeBuilder {
    module: Rc<ModuleInner>,
    name: Ident,
    attrs: TypeAttributes,
    parent: Option<Rc<RuntimeType>>,
    contracts: Vec<Arc<Contract>>,
    methods: Vec<MethodDef>,
    fields: IndexMap<Ident, FieldRef>,
    /// (contract name, member slot) -> method.
    overrides: IndexMap<(Ident, usize), usize>,
    materialized: bool,
}

impl TypeBuilder {
    pub(crate) fn new(
        module: Rc<ModuleInner>,
        name: Ident,
        attrs: TypeAttributes,
        parent: Option<Rc<RuntimeType>>,
        contracts: Vec<Arc<Contract>>,
    ) -> Self {
        Self {
            module,
            name,
            attrs,
            parent,
            contracts,
            methods: Vec::new(),
            fields: IndexMap::new(),
            overrides: IndexMap::new(),
            materialized: false,
        }
    }

    /// Type name.
    pub fn name(&self) -> &str { &self.name }

    /// Reference to this type, for operands.
    pub fn type_ref(&self) -> TypeRef { TypeRef::named(self.name.clone()) }

    /// Attributes.
    pub const fn attributes(&self) -> TypeAttributes { self.attrs }

    /// Contracts declared on this type (base types excluded).
    pub fn contracts(&self) -> &[Arc<Contract>] { &self.contracts }

    /// True once [`create_type`](Self::create_type) succeeded.
    pub const fn is_materialized(&self) -> bool { self.materialized }

    /// True when the type (or a base) lists the contract.
    pub fn implements(&self, contract: &str) -> bool {
        self.contracts.iter().any(|c| c.name() == contract)
            || self.parent.as_ref().is_some_and(|p| p.implements(contract))
    }

    fn ensure_open(&self) -> HostResult<()> {
        if self.materialized {
            return Err(HostError::AlreadyMaterialized { ty: self.name.clone() });
        }
        Ok(())
    }

    fn def(&self, id: MethodId) -> HostResult<&MethodDef> {
        self.methods
            .get(id.0)
            .ok_or_else(|| HostError::UnknownMethod { ty: self.name.clone(), method: format!("#{}", id.0) })
    }

    fn def_mut(&mut self, id: MethodId) -> HostResult<&mut MethodDef> {
        let ty = &self.name;
        self.methods
            .get_mut(id.0)
            .ok_or_else(|| HostError::UnknownMethod { ty: ty.clone(), method: format!("#{}", id.0) })
    }

    /// True when a method with this name and these parameter types exists.
    pub fn has_method(&self, name: &str, params: &[TypeRef]) -> bool {
        self.methods.iter().any(|m| m.name == name && m.sig.params == params)
    }

    /// True when a method is already recorded for this contract slot.
    pub fn is_slot_bound(&self, contract: &str, slot: usize) -> bool {
        self.overrides.contains_key(&(contract.to_owned(), slot))
    }

    /// Adds a contract to the implemented list.
    pub fn add_contract(&mut self, contract: Arc<Contract>) -> HostResult<()> {
        self.ensure_open()?;
        if !self.contracts.iter().any(|c| c.name() == contract.name()) {
            self.contracts.push(contract);
        }
        Ok(())
    }

    /// Declares a method with an empty, open body.
    pub fn define_method(
        &mut self,
        name: impl Into<Ident>,
        attrs: MethodAttributes,
        ret: TypeRef,
        params: impl Into<Vec<TypeRef>>,
    ) -> HostResult<MethodId> {
        self.ensure_open()?;
        let name = name.into();
        let sig = Signature::new(ret, params);
        if self.has_method(&name, &sig.params) {
            return Err(HostError::DuplicateMethod { ty: self.name.clone(), method: name });
        }
        debug!(ty = %self.name, method = %name, sig = %sig, "define method");
        self.methods.push(MethodDef { name, attrs, sig, body: BodyState::Open(MethodBody::new()) });
        Ok(MethodId(self.methods.len() - 1))
    }

    /// Declares an instance constructor.
    pub fn define_constructor(
        &mut self,
        attrs: MethodAttributes,
        params: impl Into<Vec<TypeRef>>,
    ) -> HostResult<MethodId> {
        let attrs = (attrs | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME)
            .difference(MethodAttributes::STATIC);
        self.define_method(CTOR_NAME, attrs, TypeRef::Void, params)
    }

    /// Declares a field.
    pub fn define_field(&mut self, name: impl Into<Ident>, ty: TypeRef, is_static: bool) -> HostResult<FieldRef> {
        self.ensure_open()?;
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(HostError::DuplicateField { ty: self.name.clone(), field: name });
        }
        let field = FieldRef { owner: self.type_ref(), name: name.clone(), ty, is_static };
        self.fields.insert(name, field.clone());
        Ok(field)
    }

    /// Signature of a declared method.
    pub fn method_signature(&self, id: MethodId) -> HostResult<&Signature> { Ok(&self.def(id)?.sig) }

    /// Reference to a declared method, for `call`/`callvirt`/`newobj` operands.
    pub fn method_ref(&self, id: MethodId) -> HostResult<ilforge_core::MethodRef> {
        let def = self.def(id)?;
        Ok(ilforge_core::MethodRef {
            owner: self.type_ref(),
            name: def.name.clone(),
            sig: def.sig.clone(),
            has_this: def.has_this(),
            varargs: Vec::new(),
        })
    }

    /// The open body of a method.
    pub fn method_body_mut(&mut self, id: MethodId) -> HostResult<&mut MethodBody> {
        self.ensure_open()?;
        let ty = self.name.clone();
        let def = self.def_mut(id)?;
        match &mut def.body {
            BodyState::Open(body) => Ok(body),
            BodyState::Sealed(_) | BodyState::Invalid(_) => Err(HostError::BodySealed { ty, method: def.name.clone() }),
        }
    }

    /// Replaces the open body of a method (for bodies built elsewhere, e.g. assembled text).
    pub fn set_method_body(&mut self, id: MethodId, body: MethodBody) -> HostResult<()> {
        *self.method_body_mut(id)? = body;
        Ok(())
    }

    /// Seals a method body now rather than at materialization.
    ///
    /// On failure the method is left unusable and `create_type` reports the
    /// same defect.
    pub fn seal_method_body(&mut self, id: MethodId) -> HostResult<()> {
        self.ensure_open()?;
        let ty = self.name.clone();
        let def = self.def_mut(id)?;
        match def.body.seal() {
            Ok(sealed) => {
                debug!(ty = %ty, method = %def.name, size = sealed.len(), "sealed body");
                Ok(())
            }
            Err(source) => Err(HostError::InvalidBody { ty, method: def.name.clone(), source }),
        }
    }

    /// Drops the most recently defined method. Only the last method can go,
    /// and only while no override binds it; earlier ids stay valid.
    pub fn discard_method(&mut self, id: MethodId) -> HostResult<()> {
        self.ensure_open()?;
        let is_last = self.methods.len().checked_sub(1) == Some(id.0);
        if !is_last || self.overrides.values().any(|&i| i == id.0) {
            return Err(HostError::UnknownMethod { ty: self.name.clone(), method: format!("#{}", id.0) });
        }
        if let Some(def) = self.methods.pop() {
            debug!(ty = %self.name, method = %def.name, "discarded method");
        }
        Ok(())
    }

    /// Records `id` as the implementation of `member` of `contract`.
    pub fn define_method_override(
        &mut self,
        id: MethodId,
        contract: &Contract,
        member: &ContractMember,
    ) -> HostResult<()> {
        self.ensure_open()?;
        if !self.implements(contract.name()) {
            return Err(HostError::ContractNotImplemented {
                ty: self.name.clone(),
                contract: contract.name().to_owned(),
            });
        }
        let def = self.def(id)?;
        if !def.has_this() || def.sig != *member.signature() {
            let found = if def.has_this() { def.sig.to_string() } else { format!("static {}", def.sig) };
            return Err(HostError::SignatureMismatch {
                ty: self.name.clone(),
                method: def.name.clone(),
                expected: member.signature().to_string(),
                found,
            });
        }
        let key = (contract.name().to_owned(), member.slot());
        if self.overrides.contains_key(&key) {
            return Err(HostError::SlotAlreadyBound {
                ty: self.name.clone(),
                contract: contract.name().to_owned(),
                member: member.to_string(),
            });
        }
        debug!(ty = %self.name, method = %def.name, contract = %contract.name(), member = %member, "bind override");
        self.overrides.insert(key, id.0);
        Ok(())
    }

    /// Materializes the type.
    ///
    /// Seals open bodies, validates them when the module asks for it, checks
    /// that every contract member has an implementation, builds the
    /// dispatch table and registers the type in its module.
    pub fn create_type(&mut self) -> HostResult<Rc<RuntimeType>> {
        self.ensure_open()?;
        let validate = self.module.options.validate_bodies;

        let mut methods = Vec::with_capacity(self.methods.len());
        for def in &mut self.methods {
            let invalid = |source: CoreError| HostError::InvalidBody {
                ty: self.name.clone(),
                method: def.name.clone(),
                source,
            };
            let sealed = def.body.seal().map_err(invalid)?.clone();
            if validate {
                let arg_count = def.sig.params.len() + usize::from(def.has_this());
                let arg_count = u16::try_from(arg_count).unwrap_or(u16::MAX);
                validate_body(&sealed, arg_count).map_err(invalid)?;
            }
            let program = sealed.decode().map_err(invalid)?;
            methods.push(Rc::new(RuntimeMethod {
                owner: self.name.clone(),
                name: def.name.clone(),
                attrs: def.attrs,
                sig: def.sig.clone(),
                body: sealed,
                program,
            }));
        }

        let dispatch = self.build_dispatch(&methods)?;

        let mut fields = IndexMap::new();
        let mut statics = IndexMap::new();
        for field in self.fields.values() {
            if field.is_static {
                statics.insert(field.name.clone(), Value::default_for(&field.ty));
            } else {
                fields.insert(field.name.clone(), field.ty.clone());
            }
        }

        let ty = Rc::new(RuntimeType {
            module: Rc::clone(&self.module),
            name: self.name.clone(),
            attrs: self.attrs,
            parent: self.parent.clone(),
            contracts: self.contracts.clone(),
            methods,
            dispatch,
            fields,
            statics: std::cell::RefCell::new(statics),
        });
        self.module.register(&ty);
        self.materialized = true;
        debug!(ty = %self.name, methods = ty.methods.len(), contracts = self.contracts.len(), "materialized type");
        Ok(ty)
    }

    fn build_dispatch(&self, methods: &[Rc<RuntimeMethod>]) -> HostResult<IndexMap<Ident, Vec<Rc<RuntimeMethod>>>> {
        let mut dispatch = IndexMap::new();
        if let Some(parent) = &self.parent {
            for (name, slots) in &parent.dispatch {
                dispatch.insert(name.clone(), slots.clone());
            }
        }

        for contract in &self.contracts {
            let mut slots = Vec::with_capacity(contract.members().len());
            for member in contract.members() {
                let key = (contract.name().to_owned(), member.slot());
                let explicit = self.overrides.get(&key).map(|&i| Rc::clone(&methods[i]));
                let implementation = explicit
                    .or_else(|| implicit_impl(methods, member))
                    .or_else(|| self.parent.as_ref()?.find_method(member.name(), &member.signature().params, true))
                    .filter(|m| m.sig == *member.signature())
                    .or_else(|| self.parent.as_ref()?.dispatch_slot(contract.name(), member.slot()));
                let Some(implementation) = implementation else {
                    return Err(HostError::MissingImplementation {
                        ty: self.name.clone(),
                        contract: contract.name().to_owned(),
                        member: member.to_string(),
                    });
                };
                slots.push(implementation);
            }
            dispatch.insert(contract.name().to_owned(), slots);
        }

        // explicit re-implementations of contracts inherited from the base type
        for ((contract, slot), &index) in &self.overrides {
            if let Some(entry) = dispatch.get_mut(contract).and_then(|slots| slots.get_mut(*slot)) {
                *entry = Rc::clone(&methods[index]);
            }
        }
        Ok(dispatch)
    }
}

/// Public instance method matching a member by name and signature.
fn implicit_impl(methods: &[Rc<RuntimeMethod>], member: &ContractMember) -> Option<Rc<RuntimeMethod>> {
    methods
        .iter()
        .find(|m| {
            m.has_this()
                && m.name == member.name()
                && m.sig == *member.signature()
                && m.attrs.contains(MethodAttributes::PUBLIC)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{AssemblyAccess, AssemblyBuilder, AssemblyName};
    use crate::ExecError;
    use ilforge_core::{OpCode, Operand};
    use pretty_assertions::assert_eq;

    fn module() -> crate::ModuleBuilder {
        let mut asm = AssemblyBuilder::define_dynamic_assembly(AssemblyName::new("Tests"), AssemblyAccess::Run);
        asm.define_dynamic_module("Main").expect("module")
    }

    fn counter() -> Arc<Contract> {
        Contract::builder("ICounter")
            .member("Next", TypeRef::I32, [TypeRef::I32])
            .member("Reset", TypeRef::Void, Vec::new())
            .build()
    }

    fn emit_all(body: &mut MethodBody, ops: &[OpCode]) {
        for &op in ops {
            body.emit(op, Operand::None);
        }
    }

    #[test]
    fn explicit_override_dispatches() {
        let contract = counter();
        let module = module();
        let mut tb = module.define_public_class("Counter", None, &[contract.clone()]).expect("type");

        let next = tb.define_method("Next", MethodAttributes::OVERRIDE, TypeRef::I32, [TypeRef::I32]).expect("next");
        emit_all(tb.method_body_mut(next).expect("body"), &[OpCode::Ldarg_1, OpCode::Ldc_I4_1, OpCode::Add, OpCode::Ret]);
        let reset = tb.define_method("Reset", MethodAttributes::OVERRIDE, TypeRef::Void, Vec::new()).expect("reset");
        emit_all(tb.method_body_mut(reset).expect("body"), &[OpCode::Ret]);

        let member = contract.resolve_member("Next", &[TypeRef::I32]).expect("member");
        tb.define_method_override(next, &contract, member).expect("bind");
        let ty = tb.create_type().expect("create");
        assert!(tb.is_materialized());

        let obj = ty.instantiate().expect("instance");
        let out = obj.invoke_member(&contract, member, &[Value::I32(41)]).expect("invoke");
        assert_eq!(out, Value::I32(42));
        // Reset is bound implicitly by name and signature
        assert_eq!(ty.dispatch_slot("ICounter", 1).expect("slot").name(), "Reset");
    }

    #[test]
    fn missing_member_fails_materialization() {
        let contract = counter();
        let module = module();
        let mut tb = module.define_public_class("Half", None, &[contract]).expect("type");
        let next = tb.define_method("Next", MethodAttributes::OVERRIDE, TypeRef::I32, [TypeRef::I32]).expect("next");
        emit_all(tb.method_body_mut(next).expect("body"), &[OpCode::Ldarg_1, OpCode::Ret]);
        let err = tb.create_type().unwrap_err();
        assert_eq!(err.to_string(), "type `Half` does not implement `ICounter::Reset()`");
        assert!(!tb.is_materialized());
    }

    #[test]
    fn binding_checks_signature_and_slot() {
        let contract = counter();
        let module = module();
        let mut tb = module.define_public_class("Wrong", None, &[contract.clone()]).expect("type");
        let m = tb.define_method("Next", MethodAttributes::OVERRIDE, TypeRef::I64, [TypeRef::I32]).expect("m");
        let member = contract.resolve_member("Next", &[TypeRef::I32]).expect("member");
        assert!(matches!(tb.define_method_override(m, &contract, member), Err(HostError::SignatureMismatch { .. })));

        let ok = tb.define_method("Next2", MethodAttributes::OVERRIDE, TypeRef::I32, [TypeRef::I32]).expect("ok");
        tb.define_method_override(ok, &contract, member).expect("first bind");
        assert!(matches!(tb.define_method_override(ok, &contract, member), Err(HostError::SlotAlreadyBound { .. })));

        let other = Contract::builder("IOther").member("Next", TypeRef::I32, [TypeRef::I32]).build();
        let member = other.resolve_member("Next", &[TypeRef::I32]).expect("member");
        assert!(matches!(
            tb.define_method_override(ok, &other, member),
            Err(HostError::ContractNotImplemented { .. })
        ));
    }

    #[test]
    fn materialized_type_refuses_changes() {
        let module = module();
        let mut tb = module.define_public_class("Done", None, &[]).expect("type");
        tb.create_type().expect("create");
        assert!(matches!(
            tb.define_method("Late", MethodAttributes::PUBLIC, TypeRef::Void, Vec::new()),
            Err(HostError::AlreadyMaterialized { .. })
        ));
        assert!(matches!(tb.create_type(), Err(HostError::AlreadyMaterialized { .. })));
    }

    #[test]
    fn invalid_body_names_the_method() {
        let module = module();
        let mut tb = module.define_public_class("Broken", None, &[]).expect("type");
        let m = tb.define_method("Jump", MethodAttributes::PUBLIC | MethodAttributes::STATIC, TypeRef::Void, Vec::new());
        let m = m.expect("m");
        let body = tb.method_body_mut(m).expect("body");
        let nowhere = body.define_label();
        body.emit(OpCode::Br, Operand::Target(nowhere));
        let err = tb.seal_method_body(m).unwrap_err();
        assert!(err.to_string().starts_with("invalid body for `Broken::Jump`"), "{err}");
        assert!(matches!(tb.method_body_mut(m), Err(HostError::BodySealed { .. })));
        assert!(matches!(tb.create_type(), Err(HostError::InvalidBody { .. })));
    }

    #[test]
    fn discarding_a_broken_method_frees_its_name() {
        let module = module();
        let mut tb = module.define_public_class("Retry", None, &[]).expect("type");
        let attrs = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
        let keep = tb.define_method("Keep", attrs, TypeRef::Void, Vec::new()).expect("keep");
        emit_all(tb.method_body_mut(keep).expect("body"), &[OpCode::Ret]);
        let m = tb.define_method("Jump", attrs, TypeRef::Void, Vec::new()).expect("m");
        let body = tb.method_body_mut(m).expect("body");
        let nowhere = body.define_label();
        body.emit(OpCode::Br, Operand::Target(nowhere));
        assert!(tb.seal_method_body(m).is_err());

        assert!(matches!(tb.discard_method(keep), Err(HostError::UnknownMethod { .. })));
        tb.discard_method(m).expect("discard");
        assert!(!tb.has_method("Jump", &[]));

        let m = tb.define_method("Jump", attrs, TypeRef::Void, Vec::new()).expect("again");
        emit_all(tb.method_body_mut(m).expect("body"), &[OpCode::Ret]);
        let ty = tb.create_type().expect("create");
        assert_eq!(ty.invoke_static("Jump", &[]).expect("run"), Value::Void);
    }

    #[test]
    fn validation_rejects_out_of_range_argument() {
        let module = module();
        let mut tb = module.define_public_class("Args", None, &[]).expect("type");
        let m = tb.define_method("F", MethodAttributes::PUBLIC | MethodAttributes::STATIC, TypeRef::I32, Vec::new());
        let m = m.expect("m");
        emit_all(tb.method_body_mut(m).expect("body"), &[OpCode::Ldarg_0, OpCode::Ret]);
        assert!(matches!(tb.create_type(), Err(HostError::InvalidBody { .. })));
    }

    #[test]
    fn static_methods_fields_and_limits() {
        let mut asm = AssemblyBuilder::define_dynamic_assembly(AssemblyName::new("Limits"), AssemblyAccess::Run);
        let options = crate::HostOptions::default().with_max_steps(50);
        let module = asm.define_dynamic_module_with("Main", options).expect("module");
        let mut tb = module.define_public_class("Prog", None, &[]).expect("type");
        let hits = tb.define_field("Hits", TypeRef::I32, true).expect("field");

        let spin = tb.define_method("Spin", MethodAttributes::PUBLIC | MethodAttributes::STATIC, TypeRef::Void, Vec::new());
        let spin = spin.expect("spin");
        let body = tb.method_body_mut(spin).expect("body");
        let top = body.define_label();
        body.mark_label(top);
        body.emit(OpCode::Ldsfld, Operand::Field(hits.clone()));
        body.emit(OpCode::Ldc_I4_1, Operand::None);
        body.emit(OpCode::Add, Operand::None);
        body.emit(OpCode::Stsfld, Operand::Field(hits));
        body.emit(OpCode::Br_S, Operand::Target(top));

        let ty = tb.create_type().expect("create");
        let err = ty.invoke_static("Spin", &[]).unwrap_err();
        assert!(matches!(err, HostError::Exec(ExecError::StepLimit(50))), "{err}");
        assert_eq!(ty.get_static("Hits"), Some(Value::I32(10)));
    }
}
