//! Import Object construction.
//!
//! This module assembles the complete set of host functions a module's
//! runtime glue imports, ready to hand to
//! [`Loader::instantiate`](shimrun_core::Loader::instantiate).

use std::sync::Arc;

use tracing::info;

use shimrun_common::RuntimeError;
use shimrun_core::{CapabilitySet, ImportObject, WasmEngine};

use crate::runtime::{RUNTIME_NAMESPACE, register_runtime};
use crate::shim::{CapabilityShim, HOST_NAMESPACE};

/// Register all standard host functions on an import object.
///
/// This registers:
/// - `host::*` - the capability shim for `capabilities`
/// - `runtime::*` - callback scheduling and exit
///
/// The shim is installed first; if it fails nothing else is registered.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(
    imports: &mut ImportObject,
    capabilities: &Arc<CapabilitySet>,
) -> Result<(), RuntimeError> {
    CapabilityShim::new(Arc::clone(capabilities)).install(imports)?;
    register_runtime(imports)?;
    Ok(())
}

/// Build a fresh import object with every host function registered.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn import_object(
    engine: &WasmEngine,
    capabilities: &Arc<CapabilitySet>,
) -> Result<ImportObject, RuntimeError> {
    let mut imports = ImportObject::new(engine);
    register_all(&mut imports, capabilities)?;

    info!(
        namespaces = ?[HOST_NAMESPACE, RUNTIME_NAMESPACE],
        "Import object ready"
    );
    Ok(imports)
}
