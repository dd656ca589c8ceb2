//! ilforge-host — hôte de code dynamique
//!
//! Fournit :
//! - `AssemblyBuilder` / `ModuleBuilder` / `TypeBuilder` : définition de types à l'exécution
//! - `Contract` + macro [`contract!`] : contrats d'interface nommés, membres typés
//! - Liaison explicite d'overrides (`define_method_override`) et matérialisation (`create_type`)
//! - `RuntimeType` / `Instance` : types matérialisés, dispatch par contrat
//! - Interpréteur de référence sur les corps scellés (limites de pas et de profondeur)
//! - Fonctions natives enregistrées par module (`register_native`)
//! - Erreurs `HostError` / `ExecError`
//!
//! Features :
//! - `std` (par défaut) : relaie `ilforge-core/std`, ne conditionne aucun code
//! - `serde` : (dé)sérialisation de `HostOptions`, `AssemblyName`, `AssemblyAccess`
//!
//! Exemple :
//! ```
//! use ilforge_host::prelude::*;
//!
//! contract! {
//!     /// Calcule un entier.
//!     pub ICompute { fn Compute(i32) -> i32; }
//! }
//!
//! let mut asm = AssemblyBuilder::define_dynamic_assembly(AssemblyName::new("Demo"), AssemblyAccess::Run);
//! let module = asm.define_dynamic_module("Main")?;
//! let contract = ICompute::contract();
//! let mut tb = module.define_public_class("Doubler", None, &[contract.clone()])?;
//!
//! let m = tb.define_method("Compute", MethodAttributes::OVERRIDE, TypeRef::I32, [TypeRef::I32])?;
//! let body = tb.method_body_mut(m)?;
//! body.emit(OpCode::Ldarg_1, Operand::None);
//! body.emit(OpCode::Ldc_I4_2, Operand::None);
//! body.emit(OpCode::Mul, Operand::None);
//! body.emit(OpCode::Ret, Operand::None);
//! tb.define_method_override(m, &contract, contract.resolve_member("Compute", &[TypeRef::I32])?)?;
//!
//! let ty = tb.create_type()?;
//! let out = ty.instantiate()?.invoke::<ICompute>("Compute", &[Value::I32(21)])?;
//! assert_eq!(out, Value::I32(42));
//! # Ok::<(), ilforge_host::HostError>(())
//! ```

/* ─────────────────────────── Modules ─────────────────────────── */

/// Assemblies, modules, natives.
pub mod assembly;
/// Contrats d'interface et macro `contract!`.
pub mod contract;
/// Erreurs d'hôte et d'exécution.
pub mod error;
/// Options d'exécution.
pub mod options;
/// Types matérialisés, méthodes, instances.
pub mod runtime;
/// Construction de types : attributs, méthodes, champs, overrides.
pub mod types;
/// Valeurs manipulées par l'interpréteur.
pub mod value;

mod interp;

/* ─────────────────────────── Réexports ─────────────────────────── */

pub use ilforge_core::{
    CallSite, FieldRef, Ident, Label, Local, MethodBody, MethodRef, OpCode, Operand, Signature, StaticType, Token,
    TypeRef,
};

pub use assembly::{AssemblyAccess, AssemblyBuilder, AssemblyName, ModuleBuilder, NativeFn};
pub use contract::{Contract, ContractBuilder, ContractMember, ContractType};
pub use error::{ExecError, ExecResult, HostError, HostResult};
pub use options::HostOptions;
pub use runtime::{HeapObject, Instance, RuntimeMethod, RuntimeType};
pub use types::{MethodAttributes, MethodId, TypeAttributes, TypeBuilder};
pub use value::{ArrayData, BoxedValue, Value};

/// Réexports utiles pour une importation rapide.
pub mod prelude {
    pub use crate::contract;
    pub use crate::{
        AssemblyAccess, AssemblyBuilder, AssemblyName, Contract, ContractMember, ContractType, ExecError, HostError,
        HostOptions, HostResult, Instance, MethodAttributes, MethodBody, MethodId, ModuleBuilder, OpCode, Operand,
        RuntimeType, TypeAttributes, TypeBuilder, TypeRef, Value,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
