//! The import object handed to instantiation.
//!
//! An [`ImportObject`] maps `(namespace, name)` to host functions. It is
//! filled by the runtime glue; the loader only passes it to Wasmtime and asks
//! it which of a module's imports it cannot satisfy.

use wasmtime::{Linker, Module, Store};

use crate::WasmEngine;
use crate::store::RunContext;
use shimrun_common::RuntimeError;

/// Host functions keyed by `(namespace, name)`.
#[derive(Clone)]
pub struct ImportObject {
    linker: Linker<RunContext>,
}

impl ImportObject {
    /// Create an empty import object for `engine`.
    pub fn new(engine: &WasmEngine) -> Self {
        Self {
            linker: Linker::new(engine.inner()),
        }
    }

    /// Get a reference to the underlying linker.
    pub fn linker(&self) -> &Linker<RunContext> {
        &self.linker
    }

    /// Get a mutable reference to the underlying linker.
    ///
    /// Definitions added here are visible immediately. Prefer
    /// [`install`](Self::install) when several definitions must appear
    /// together.
    pub fn linker_mut(&mut self) -> &mut Linker<RunContext> {
        &mut self.linker
    }

    /// Define a group of host functions atomically.
    ///
    /// `define` runs against a staged copy with shadowing enabled; the copy
    /// replaces this import object only if `define` succeeds. Redefining an
    /// existing name with the same function is therefore a no-op in effect,
    /// and a failure leaves the import object untouched.
    pub fn install<F>(&mut self, define: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut Linker<RunContext>) -> Result<(), RuntimeError>,
    {
        let mut staged = self.linker.clone();
        staged.allow_shadowing(true);

        define(&mut staged)?;

        self.linker = staged;
        Ok(())
    }

    /// The first import of `module` with no definition here.
    pub fn first_missing(
        &self,
        store: &mut Store<RunContext>,
        module: &Module,
    ) -> Option<(String, String)> {
        module
            .imports()
            .find(|import| {
                self.linker
                    .get(&mut *store, import.module(), import.name())
                    .is_none()
            })
            .map(|import| (import.module().to_string(), import.name().to_string()))
    }
}

impl std::fmt::Debug for ImportObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportObject").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::CompiledModule;
    use crate::capability::CapabilitySet;
    use crate::store::create_store;
    use shimrun_common::{EngineConfig, ExecutionConfig};

    fn setup() -> (WasmEngine, Store<RunContext>) {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let ctx = RunContext::new(Arc::new(CapabilitySet::builder().build()), "t".into());
        let store = create_store(&engine, &ExecutionConfig::default(), ctx).unwrap();
        (engine, store)
    }

    const IMPORTS_WAT: &str = r#"
        (module
            (import "host" "a" (func))
            (import "host" "b" (func)))
    "#;

    #[test]
    fn test_first_missing() {
        let (engine, mut store) = setup();
        let module = CompiledModule::from_wat(engine.inner(), IMPORTS_WAT).unwrap();

        let mut imports = ImportObject::new(&engine);
        assert_eq!(
            imports.first_missing(&mut store, module.inner()),
            Some(("host".into(), "a".into()))
        );

        imports.linker_mut().func_wrap("host", "a", || {}).unwrap();
        assert_eq!(
            imports.first_missing(&mut store, module.inner()),
            Some(("host".into(), "b".into()))
        );

        imports.linker_mut().func_wrap("host", "b", || {}).unwrap();
        assert!(imports.first_missing(&mut store, module.inner()).is_none());
    }

    #[test]
    fn test_install_is_atomic() {
        let (engine, mut store) = setup();
        let module = CompiledModule::from_wat(engine.inner(), IMPORTS_WAT).unwrap();
        let mut imports = ImportObject::new(&engine);

        let result = imports.install(|linker| {
            linker
                .func_wrap("host", "a", || {})
                .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;
            Err(RuntimeError::invalid_config("second definition failed"))
        });

        assert!(result.is_err());
        // "a" was staged but never committed
        assert_eq!(
            imports.first_missing(&mut store, module.inner()),
            Some(("host".into(), "a".into()))
        );
    }

    #[test]
    fn test_install_twice_is_idempotent() {
        let (engine, mut store) = setup();
        let module = CompiledModule::from_wat(engine.inner(), IMPORTS_WAT).unwrap();
        let mut imports = ImportObject::new(&engine);

        let define = |linker: &mut Linker<RunContext>| {
            linker
                .func_wrap("host", "a", || {})
                .and_then(|l| l.func_wrap("host", "b", || {}))
                .map(|_| ())
                .map_err(|e| RuntimeError::invalid_config(e.to_string()))
        };

        imports.install(define).unwrap();
        imports.install(define).unwrap();
        assert!(imports.first_missing(&mut store, module.inner()).is_none());
    }
}
