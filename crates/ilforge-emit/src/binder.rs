//! Contract override binder.
//!
//! Declares a method for one contract member, lets a callback fill its body
//! through [`Il`], seals the body and binds it to the member's slot, all in
//! one call that returns the type builder for chaining:
//!
//! ```
//! use ilforge_emit::prelude::*;
//!
//! contract! {
//!     pub ICalc { fn SquareTimesTwo(i32) -> i32; }
//! }
//!
//! let ty = AssemblyName::new("Demo")
//!     .define_dynamic_assembly()
//!     .define_dynamic_module("Demo")?
//!     .define_public_class("Calc", None, &[ICalc::contract()])?
//!     .define_func_override1::<ICalc, i32, i32>("SquareTimesTwo", |il| {
//!         il.ldarg_1().dup().mul().ldc_i4_2().mul().ret();
//!     })?
//!     .create_type()?;
//!
//! let calc = ty.instantiate()?;
//! assert_eq!(calc.invoke::<ICalc>("SquareTimesTwo", &[Value::I32(9)])?, Value::I32(162));
//! # Ok::<(), HostError>(())
//! ```

use ilforge_core::{Signature, StaticType, TypeRef};
use ilforge_host::{Contract, ContractType, HostError, HostResult, MethodAttributes, TypeBuilder};
use tracing::debug;

use crate::il::Il;

/// Override binding on a type under construction.
///
/// The shaped forms derive the member signature from type parameters: `C`
/// is the contract, `R` the return type, `T1..T3` the parameter types. All
/// of them delegate to [`define_override`](Self::define_override).
pub trait DefineOverride {
    /// Implements `name(params) -> ret` of `contract` with the body written by `gen`.
    ///
    /// Fails before declaring anything when the member does not exist, its
    /// return type differs, the type does not list the contract or the slot
    /// is already implemented; the builder stays usable after such errors.
    /// A body that fails to seal is reported as [`HostError::InvalidBody`].
    fn define_override(
        &mut self,
        contract: &Contract,
        name: &str,
        ret: TypeRef,
        params: &[TypeRef],
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self>;

    /// `void name()`.
    fn define_action_override<C: ContractType>(&mut self, name: &str, gen: impl FnOnce(&mut Il<'_>)) -> HostResult<&mut Self> {
        self.define_override(&C::contract(), name, TypeRef::Void, &[], gen)
    }

    /// `void name(T1)`.
    fn define_action_override1<C: ContractType, T1: StaticType>(
        &mut self,
        name: &str,
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        self.define_override(&C::contract(), name, TypeRef::Void, &[T1::type_ref()], gen)
    }

    /// `void name(T1, T2)`.
    fn define_action_override2<C: ContractType, T1: StaticType, T2: StaticType>(
        &mut self,
        name: &str,
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        self.define_override(&C::contract(), name, TypeRef::Void, &[T1::type_ref(), T2::type_ref()], gen)
    }

    /// `void name(T1, T2, T3)`.
    fn define_action_override3<C: ContractType, T1: StaticType, T2: StaticType, T3: StaticType>(
        &mut self,
        name: &str,
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        let params = [T1::type_ref(), T2::type_ref(), T3::type_ref()];
        self.define_override(&C::contract(), name, TypeRef::Void, &params, gen)
    }

    /// `R name()`.
    fn define_func_override<C: ContractType, R: StaticType>(
        &mut self,
        name: &str,
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        self.define_override(&C::contract(), name, R::type_ref(), &[], gen)
    }

    /// `R name(T1)`.
    fn define_func_override1<C: ContractType, R: StaticType, T1: StaticType>(
        &mut self,
        name: &str,
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        self.define_override(&C::contract(), name, R::type_ref(), &[T1::type_ref()], gen)
    }

    /// `R name(T1, T2)`.
    fn define_func_override2<C: ContractType, R: StaticType, T1: StaticType, T2: StaticType>(
        &mut self,
        name: &str,
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        self.define_override(&C::contract(), name, R::type_ref(), &[T1::type_ref(), T2::type_ref()], gen)
    }

    /// `R name(T1, T2, T3)`.
    fn define_func_override3<C: ContractType, R: StaticType, T1: StaticType, T2: StaticType, T3: StaticType>(
        &mut self,
        name: &str,
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        let params = [T1::type_ref(), T2::type_ref(), T3::type_ref()];
        self.define_override(&C::contract(), name, R::type_ref(), &params, gen)
    }
}

impl DefineOverride for TypeBuilder {
    fn define_override(
        &mut self,
        contract: &Contract,
        name: &str,
        ret: TypeRef,
        params: &[TypeRef],
        gen: impl FnOnce(&mut Il<'_>),
    ) -> HostResult<&mut Self> {
        if self.is_materialized() {
            return Err(HostError::AlreadyMaterialized { ty: self.name().to_owned() });
        }
        let member = contract.resolve_member(name, params)?;
        if member.signature().ret != ret {
            return Err(HostError::SignatureMismatch {
                ty: self.name().to_owned(),
                method: name.to_owned(),
                expected: member.signature().to_string(),
                found: Signature::new(ret, params.to_vec()).to_string(),
            });
        }
        if !self.implements(contract.name()) {
            return Err(HostError::ContractNotImplemented {
                ty: self.name().to_owned(),
                contract: contract.name().to_owned(),
            });
        }
        if self.is_slot_bound(contract.name(), member.slot()) {
            return Err(HostError::SlotAlreadyBound {
                ty: self.name().to_owned(),
                contract: contract.name().to_owned(),
                member: member.to_string(),
            });
        }

        // a same-named method from another contract keeps the plain name
        let method_name = if self.has_method(name, params) {
            format!("{}.{name}", contract.name())
        } else {
            name.to_owned()
        };
        let id = self.define_method(method_name, MethodAttributes::OVERRIDE, ret, params.to_vec())?;
        gen(&mut Il::new(self.method_body_mut(id)?));
        if let Err(err) = self.seal_method_body(id) {
            // leave the builder as it was before the call
            self.discard_method(id)?;
            return Err(err);
        }
        self.define_method_override(id, contract, member)?;
        debug!(ty = %self.name(), contract = %contract.name(), member = %member, "override defined");
        Ok(self)
    }
}
