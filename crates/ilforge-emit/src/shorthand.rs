//! Shorthands that turn type construction into one flat pipeline:
//! assembly name → assembly → module → class → overrides → `create_type`.
//!
//! Each step optionally takes a build callback run on the new builder
//! before it is returned.

use ilforge_host::{AssemblyAccess, AssemblyBuilder, AssemblyName, HostResult, Ident, ModuleBuilder};

/// Assembly creation from a name.
pub trait AssemblyNameExt {
    /// Collectible dynamic assembly (`RunAndCollect`).
    fn define_dynamic_assembly(self) -> AssemblyBuilder;

    /// Dynamic assembly with an explicit access mode, handed to `build` first.
    fn build_dynamic_assembly<F>(self, access: AssemblyAccess, build: F) -> HostResult<AssemblyBuilder>
    where
        F: FnOnce(&mut AssemblyBuilder) -> HostResult<()>;
}

impl AssemblyNameExt for AssemblyName {
    fn define_dynamic_assembly(self) -> AssemblyBuilder {
        AssemblyBuilder::define_dynamic_assembly(self, AssemblyAccess::RunAndCollect)
    }

    fn build_dynamic_assembly<F>(self, access: AssemblyAccess, build: F) -> HostResult<AssemblyBuilder>
    where
        F: FnOnce(&mut AssemblyBuilder) -> HostResult<()>,
    {
        let mut assembly = AssemblyBuilder::define_dynamic_assembly(self, access);
        build(&mut assembly)?;
        Ok(assembly)
    }
}

/// Module creation with a build callback.
pub trait AssemblyBuilderExt {
    /// Adds a module and hands it to `build` before returning it.
    fn build_dynamic_module<F>(&mut self, name: impl Into<Ident>, build: F) -> HostResult<ModuleBuilder>
    where
        F: FnOnce(&ModuleBuilder) -> HostResult<()>;
}

impl AssemblyBuilderExt for AssemblyBuilder {
    fn build_dynamic_module<F>(&mut self, name: impl Into<Ident>, build: F) -> HostResult<ModuleBuilder>
    where
        F: FnOnce(&ModuleBuilder) -> HostResult<()>,
    {
        let module = self.define_dynamic_module(name)?;
        build(&module)?;
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefineOverride;
    use ilforge_host::{contract, ContractType, Value};
    use pretty_assertions::assert_eq;

    contract! {
        /// Retourne une constante.
        pub IAnswer { fn Answer() -> i32; }
    }

    #[test]
    fn nested_build_callbacks() {
        let mut built = None;
        let assembly = AssemblyName::new("Nested")
            .build_dynamic_assembly(AssemblyAccess::Run, |asm| {
                asm.build_dynamic_module("Main", |module| {
                    let ty = module
                        .define_public_class("Answer", None, &[IAnswer::contract()])?
                        .define_func_override::<IAnswer, i32>("Answer", |il| {
                            il.ldc_i4_s(42).ret();
                        })?
                        .create_type()?;
                    built = Some(ty);
                    Ok(())
                })?;
                Ok(())
            })
            .expect("assembly");

        assert_eq!(assembly.access(), AssemblyAccess::Run);
        assert!(assembly.get_dynamic_module("Main").is_some());
        let ty = built.expect("type");
        let out = ty.instantiate().and_then(|o| o.invoke::<IAnswer>("Answer", &[])).expect("invoke");
        assert_eq!(out, Value::I32(42));
    }

    #[test]
    fn default_access_is_collectible() {
        let asm = AssemblyName::new("Short").define_dynamic_assembly();
        assert_eq!(asm.access(), AssemblyAccess::RunAndCollect);
    }

    #[test]
    fn failing_callback_propagates() {
        let err = AssemblyName::new("Dup").build_dynamic_assembly(AssemblyAccess::Run, |asm| {
            asm.define_dynamic_module("M")?;
            asm.build_dynamic_module("M", |_| Ok(()))?;
            Ok(())
        });
        assert!(matches!(err, Err(ilforge_host::HostError::DuplicateModule(name)) if name == "M"));
    }
}
