//! Interface contracts: named, immutable member tables.
//!
//! A [`Contract`] is built once and shared behind an `Arc`. Its members are
//! indexed by name at construction so that override binding resolves a
//! member by name and exact parameter types without scanning.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::warn;

use ilforge_core::{Ident, Signature, TypeRef};

use crate::error::{HostError, HostResult};

/// One member slot of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractMember {
    name: Ident,
    sig: Signature,
    slot: usize,
}

impl ContractMember {
    /// Member name.
    pub fn name(&self) -> &str { &self.name }
    /// Declared signature.
    pub const fn signature(&self) -> &Signature { &self.sig }
    /// Position in the contract's member table.
    pub const fn slot(&self) -> usize { self.slot }
}

impl fmt::Display for ContractMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, join(&self.sig.params))?;
        if !self.sig.returns_void() {
            write!(f, " -> {}", self.sig.ret)?;
        }
        Ok(())
    }
}

/// An interface contract.
#[derive(Debug)]
pub struct Contract {
    name: Ident,
    members: Vec<ContractMember>,
    by_name: IndexMap<Ident, SmallVec<[usize; 2]>>,
}

impl PartialEq for Contract {
    fn eq(&self, other: &Self) -> bool { self.name == other.name && self.members == other.members }
}

impl Eq for Contract {}

impl Contract {
    /// Starts a contract declaration.
    pub fn builder(name: impl Into<Ident>) -> ContractBuilder {
        ContractBuilder { name: name.into(), members: Vec::new() }
    }

    /// Contract name.
    pub fn name(&self) -> &str { &self.name }

    /// Reference to the contract as a type (call owner for interface calls).
    pub fn type_ref(&self) -> TypeRef { TypeRef::named(self.name.clone()) }

    /// Members in declaration order.
    pub fn members(&self) -> &[ContractMember] { &self.members }

    /// Member in a given slot.
    pub fn member(&self, slot: usize) -> Option<&ContractMember> { self.members.get(slot) }

    /// Members sharing a name (overloads).
    pub fn members_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ContractMember> + 'a {
        self.by_name
            .get(name)
            .into_iter()
            .flat_map(|slots| slots.iter())
            .map(|&slot| &self.members[slot])
    }

    /// Finds the member with this name and exactly these parameter types.
    pub fn resolve_member(&self, name: &str, params: &[TypeRef]) -> HostResult<&ContractMember> {
        self.members_named(name)
            .find(|m| m.sig.params == params)
            .ok_or_else(|| HostError::MemberNotFound {
                contract: self.name.clone(),
                name: name.to_owned(),
                params: join(params),
            })
    }
}

fn join(types: &[TypeRef]) -> String {
    types.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Builder returned by [`Contract::builder`].
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    name: Ident,
    members: Vec<(Ident, Signature)>,
}

impl ContractBuilder {
    /// Adds a member.
    #[must_use]
    pub fn member(mut self, name: impl Into<Ident>, ret: TypeRef, params: impl Into<Vec<TypeRef>>) -> Self {
        self.members.push((name.into(), Signature::new(ret, params)));
        self
    }

    /// Freezes the member table. A repeated name/parameter pair keeps its
    /// first declaration.
    pub fn build(self) -> Arc<Contract> {
        let mut members: Vec<ContractMember> = Vec::with_capacity(self.members.len());
        let mut by_name: IndexMap<Ident, SmallVec<[usize; 2]>> = IndexMap::new();
        for (name, sig) in self.members {
            let slots = by_name.entry(name.clone()).or_default();
            if slots.iter().any(|&s| members[s].sig.params == sig.params) {
                warn!(contract = %self.name, member = %name, "duplicate contract member ignored");
                continue;
            }
            slots.push(members.len());
            members.push(ContractMember { name, sig, slot: members.len() });
        }
        Arc::new(Contract { name: self.name, members, by_name })
    }
}

/// A Rust type standing for a contract, for the type-parameterized binder
/// operations and `Instance::invoke::<C>`.
///
/// Usually implemented with [`contract!`](crate::contract).
pub trait ContractType: 'static {
    /// The shared contract.
    fn contract() -> Arc<Contract>;
}

/// Declares a unit struct implementing [`ContractType`].
///
/// ```
/// use ilforge_host::{contract, ContractType, TypeRef};
///
/// contract! {
///     /// Arithmetic helper.
///     pub Calc {
///         fn SquareTimesTwo(i32) -> i32;
///         fn Reset();
///     }
/// }
///
/// let c = Calc::contract();
/// assert_eq!(c.name(), "Calc");
/// assert!(c.resolve_member("SquareTimesTwo", &[TypeRef::I32]).is_ok());
/// ```
#[macro_export]
macro_rules! contract {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident {
            $( fn $member:ident ( $($param:ty),* $(,)? ) $(-> $ret:ty)? ; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name;

        impl $crate::ContractType for $name {
            fn contract() -> ::std::sync::Arc<$crate::Contract> {
                static CONTRACT: ::std::sync::OnceLock<::std::sync::Arc<$crate::Contract>> =
                    ::std::sync::OnceLock::new();
                CONTRACT
                    .get_or_init(|| {
                        $crate::Contract::builder(stringify!($name))
                            $(
                                .member(
                                    stringify!($member),
                                    $crate::__contract_ret!($($ret)?),
                                    ::std::vec![$(<$param as $crate::StaticType>::type_ref()),*],
                                )
                            )*
                            .build()
                    })
                    .clone()
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_ret {
    () => { $crate::TypeRef::Void };
    ($ret:ty) => { <$ret as $crate::StaticType>::type_ref() };
}
