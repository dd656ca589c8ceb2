//! ilforge-emit — builder fluide d'instructions et liaison d'overrides
//!
//! Fournit :
//! - [`Il`] : une méthode chaînable par opcode (générée depuis `for_each_opcode!`),
//!   sélection des formes courtes (`ldarg_x`, `ldc_i4_x`, …), labels frais,
//!   tables de saut (`switch_fresh::<N>()`), locals typés
//! - [`DefineOverride`] : implémentation d'un membre de contrat en un appel
//!   (formes action/fonction, arités 0 à 3, forme dynamique)
//! - Raccourcis de pipeline : nom d'assembly → assembly → module → classe
//!
//! Features :
//! - `std` (par défaut) : relaie la feature, ne conditionne aucun code
//! - `serde` : relaie la feature vers `ilforge-core` / `ilforge-host`

/* ─────────────────────────── Modules ─────────────────────────── */

/// Liaison d'overrides de contrats.
pub mod binder;
/// Builder d'instructions.
pub mod il;
/// Raccourcis assembly / module.
pub mod shorthand;

/* ─────────────────────────── Réexports ─────────────────────────── */

pub use binder::DefineOverride;
pub use il::Il;
pub use shorthand::{AssemblyBuilderExt, AssemblyNameExt};

/// Réexports utiles pour une importation rapide.
pub mod prelude {
    pub use crate::{AssemblyBuilderExt, AssemblyNameExt, DefineOverride, Il};
    pub use ilforge_core::{CallSite, FieldRef, Label, Local, MethodBody, MethodRef, OpCode, Operand, Token, TypeRef};
    pub use ilforge_host::{
        contract, AssemblyAccess, AssemblyBuilder, AssemblyName, Contract, ContractType, ExecError, HostError,
        HostOptions, HostResult, Instance, MethodAttributes, ModuleBuilder, RuntimeType, TypeAttributes, TypeBuilder,
        Value,
    };
}
