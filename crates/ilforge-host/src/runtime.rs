//! Materialized types, their methods and instances.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use ilforge_core::meta::CTOR_NAME;
use ilforge_core::{Decoded, Ident, SealedBody, Signature, TypeRef};

use crate::assembly::ModuleInner;
use crate::contract::{Contract, ContractMember, ContractType};
use crate::error::{HostError, HostResult};
use crate::interp::Machine;
use crate::types::{MethodAttributes, TypeAttributes};
use crate::value::Value;

/* ─────────────────────────── Methods ─────────────────────────── */

/// A method of a materialized type: sealed body plus its decoded program.
#[derive(Debug)]
pub struct RuntimeMethod {
    pub(crate) owner: Ident,
    pub(crate) name: Ident,
    pub(crate) attrs: MethodAttributes,
    pub(crate) sig: Signature,
    pub(crate) body: SealedBody,
    pub(crate) program: Vec<Decoded>,
}

impl RuntimeMethod {
    /// Declaring type name.
    pub fn owner(&self) -> &str { &self.owner }
    /// Method name.
    pub fn name(&self) -> &str { &self.name }
    /// Attributes.
    pub const fn attributes(&self) -> MethodAttributes { self.attrs }
    /// Signature (`this` excluded).
    pub const fn signature(&self) -> &Signature { &self.sig }
    /// Encoded body.
    pub const fn body(&self) -> &SealedBody { &self.body }
    /// Receives `this` as argument 0.
    pub const fn has_this(&self) -> bool { !self.attrs.contains(MethodAttributes::STATIC) }
    /// `Owner::name`.
    pub fn qualified_name(&self) -> String { format!("{}::{}", self.owner, self.name) }

    pub(crate) fn program(&self) -> &[Decoded] { &self.program }
}

/* ─────────────────────────── Types ─────────────────────────── */

/// A materialized type.
pub struct RuntimeType {
    pub(crate) module: Rc<ModuleInner>,
    pub(crate) name: Ident,
    pub(crate) attrs: TypeAttributes,
    pub(crate) parent: Option<Rc<RuntimeType>>,
    pub(crate) contracts: Vec<Arc<Contract>>,
    pub(crate) methods: Vec<Rc<RuntimeMethod>>,
    /// Contract name -> implementation per member slot (inherited contracts included).
    pub(crate) dispatch: IndexMap<Ident, Vec<Rc<RuntimeMethod>>>,
    pub(crate) fields: IndexMap<Ident, TypeRef>,
    pub(crate) statics: RefCell<IndexMap<Ident, Value>>,
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("name", &self.name)
            .field("attrs", &self.attrs)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("contracts", &self.contracts.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

impl RuntimeType {
    /// Type name.
    pub fn name(&self) -> &str { &self.name }
    /// Attributes.
    pub const fn attributes(&self) -> TypeAttributes { self.attrs }
    /// Base type.
    pub fn parent(&self) -> Option<&Rc<RuntimeType>> { self.parent.as_ref() }
    /// Contracts declared on this type.
    pub fn contracts(&self) -> &[Arc<Contract>] { &self.contracts }
    /// Methods declared on this type.
    pub fn methods(&self) -> impl Iterator<Item = &RuntimeMethod> { self.methods.iter().map(|m| &**m) }
    /// Name of the module the type was built in.
    pub fn module_name(&self) -> &str { &self.module.name }

    /// True when this type or a base type implements the contract.
    pub fn implements(&self, contract: &str) -> bool { self.dispatch.contains_key(contract) }

    /// True when `name` is this type or one of its bases.
    pub fn is_subtype_of(&self, name: &str) -> bool {
        self.name == name || self.parent.as_ref().is_some_and(|p| p.is_subtype_of(name))
    }

    /// Method by name, exact parameter types and instance-ness, searching base types.
    pub fn find_method(&self, name: &str, params: &[TypeRef], has_this: bool) -> Option<Rc<RuntimeMethod>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.sig.params == params && m.has_this() == has_this && m.name != CTOR_NAME)
            .cloned()
            .or_else(|| self.parent.as_ref()?.find_method(name, params, has_this))
    }

    fn find_by_arity(&self, name: &str, arity: usize, has_this: bool) -> Option<Rc<RuntimeMethod>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.sig.params.len() == arity && m.has_this() == has_this)
            .cloned()
            .or_else(|| self.parent.as_ref()?.find_by_arity(name, arity, has_this))
    }

    /// Constructor declared on this type with these parameter types.
    pub fn find_ctor(&self, params: &[TypeRef]) -> Option<Rc<RuntimeMethod>> {
        self.methods.iter().find(|m| m.name == CTOR_NAME && m.sig.params == params).cloned()
    }

    /// Implementation bound to a contract slot.
    pub fn dispatch_slot(&self, contract: &str, slot: usize) -> Option<Rc<RuntimeMethod>> {
        self.dispatch.get(contract)?.get(slot).cloned()
    }

    pub(crate) fn contract_named(&self, name: &str) -> Option<Arc<Contract>> {
        self.contracts
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .or_else(|| self.parent.as_ref()?.contract_named(name))
    }

    /// Current value of a static field.
    pub fn get_static(&self, name: &str) -> Option<Value> { self.statics.borrow().get(name).cloned() }

    /// Overwrites a static field; `false` when the field does not exist.
    pub fn set_static(&self, name: &str, value: Value) -> bool {
        match self.statics.borrow_mut().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn collect_fields(&self, out: &mut IndexMap<Ident, Value>) {
        if let Some(parent) = &self.parent {
            parent.collect_fields(out);
        }
        for (name, ty) in &self.fields {
            out.insert(name.clone(), Value::default_for(ty));
        }
    }

    pub(crate) fn allocate(self: &Rc<Self>) -> Rc<HeapObject> {
        let mut fields = IndexMap::new();
        self.collect_fields(&mut fields);
        Rc::new(HeapObject { ty: Rc::clone(self), fields: RefCell::new(fields) })
    }

    /// True for types that cannot have instances.
    pub const fn is_abstract(&self) -> bool {
        self.attrs.intersects(TypeAttributes::ABSTRACT.union(TypeAttributes::INTERFACE))
    }

    /// Creates an instance, running the parameterless constructor if one is declared.
    pub fn instantiate(self: &Rc<Self>) -> HostResult<Instance> { self.instantiate_with(&[]) }

    /// Creates an instance through the constructor taking `args.len()` arguments.
    pub fn instantiate_with(self: &Rc<Self>, args: &[Value]) -> HostResult<Instance> {
        if self.is_abstract() {
            return Err(HostError::NotInstantiable(self.name.clone()));
        }
        let object = self.allocate();
        let ctor = self.methods.iter().find(|m| m.name == CTOR_NAME && m.sig.params.len() == args.len());
        match ctor {
            Some(ctor) => {
                execute(self, ctor, Some(Value::Object(Rc::clone(&object))), args)?;
            }
            None if args.is_empty() => {}
            None => {
                return Err(HostError::UnknownMethod {
                    ty: self.name.clone(),
                    method: format!("{CTOR_NAME} with {} arguments", args.len()),
                })
            }
        }
        Ok(Instance(object))
    }

    /// Invokes a static method by name and arity.
    pub fn invoke_static(&self, name: &str, args: &[Value]) -> HostResult<Value> {
        let method = self
            .find_by_arity(name, args.len(), false)
            .ok_or_else(|| HostError::UnknownMethod { ty: self.name.clone(), method: name.to_owned() })?;
        execute(self, &method, None, args)
    }
}

fn execute(ty: &RuntimeType, method: &RuntimeMethod, this: Option<Value>, args: &[Value]) -> HostResult<Value> {
    let params = &method.sig.params;
    if args.len() != params.len() {
        return Err(crate::ExecError::ArgCount {
            method: method.qualified_name(),
            expected: params.len(),
            got: args.len(),
        }
        .into());
    }
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.extend(this);
    for (value, param) in args.iter().zip(params) {
        argv.push(value.clone().coerce_to(param)?);
    }
    Ok(Machine::new(&ty.module).invoke(method, argv)?)
}

/* ─────────────────────────── Instances ─────────────────────────── */

/// Heap storage of an object.
pub struct HeapObject {
    ty: Rc<RuntimeType>,
    fields: RefCell<IndexMap<Ident, Value>>,
}

impl HeapObject {
    /// Runtime type of the object.
    pub fn runtime_type(&self) -> &Rc<RuntimeType> { &self.ty }

    /// Reads an instance field.
    pub fn field(&self, name: &str) -> Option<Value> { self.fields.borrow().get(name).cloned() }

    /// Writes an instance field; `false` when the field does not exist.
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        match self.fields.borrow_mut().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapObject").field("ty", &self.ty.name).field("fields", &self.fields.borrow()).finish()
    }
}

/// Handle to an object created by [`RuntimeType::instantiate`].
#[derive(Debug, Clone)]
pub struct Instance(Rc<HeapObject>);

impl Instance {
    /// Runtime type of the object.
    pub fn runtime_type(&self) -> &Rc<RuntimeType> { &self.0.ty }

    /// The object as an interpreter value.
    pub fn as_value(&self) -> Value { Value::Object(Rc::clone(&self.0)) }

    /// Reads an instance field.
    pub fn field(&self, name: &str) -> Option<Value> { self.0.field(name) }

    /// Writes an instance field.
    pub fn set_field(&self, name: &str, value: Value) -> bool { self.0.set_field(name, value) }

    /// Calls a contract member through the type's dispatch table. The member
    /// is picked by name and argument count.
    pub fn invoke<C: ContractType>(&self, name: &str, args: &[Value]) -> HostResult<Value> {
        let contract = C::contract();
        let member = contract
            .members_named(name)
            .find(|m| m.signature().params.len() == args.len())
            .ok_or_else(|| HostError::MemberNotFound {
                contract: contract.name().to_owned(),
                name: name.to_owned(),
                params: args.iter().map(Value::type_name).collect::<Vec<_>>().join(", "),
            })?;
        self.invoke_member(&contract, member, args)
    }

    /// Calls the implementation bound to `member` of `contract`.
    pub fn invoke_member(&self, contract: &Contract, member: &ContractMember, args: &[Value]) -> HostResult<Value> {
        let ty = &self.0.ty;
        let method = ty.dispatch_slot(contract.name(), member.slot()).ok_or_else(|| {
            HostError::ContractNotImplemented { ty: ty.name.clone(), contract: contract.name().to_owned() }
        })?;
        execute(ty, &method, Some(self.as_value()), args)
    }

    /// Calls an instance method by name and arity (virtual lookup from the object's type).
    pub fn call(&self, name: &str, args: &[Value]) -> HostResult<Value> {
        let ty = &self.0.ty;
        let method = ty
            .find_by_arity(name, args.len(), true)
            .ok_or_else(|| HostError::UnknownMethod { ty: ty.name.clone(), method: name.to_owned() })?;
        execute(ty, &method, Some(self.as_value()), args)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self { Value::Object(instance.0) }
}
