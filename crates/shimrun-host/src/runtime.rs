//! Scheduler and exit host functions.
//!
//! These back the module's event loop: callbacks are queued on the run's
//! [`RunContext`] and delivered by [`RunHandle::run`](shimrun_core::RunHandle::run).

use tracing::{debug, trace};
use wasmtime::{Caller, Linker};
use wasmtime_wasi::I32Exit;

use shimrun_common::RuntimeError;
use shimrun_core::{ImportObject, RunContext};

/// Namespace the runtime glue functions are registered under.
pub const RUNTIME_NAMESPACE: &str = "runtime";

/// `(delay_ms: f64) -> i32`: queue a callback, returning its id.
pub const SCHEDULE_CALLBACK: &str = "scheduleCallback";

/// `(id: i32) -> i32`: cancel a queued callback.
pub const CLEAR_CALLBACK: &str = "clearCallback";

/// `(code: i32)`: end the run with `code`.
pub const EXIT: &str = "exit";

/// Register the scheduler and exit functions in `imports`.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidConfig`] if Wasmtime rejects a
/// definition.
pub fn register_runtime(imports: &mut ImportObject) -> Result<(), RuntimeError> {
    imports.install(|linker| {
        define_scheduler(linker)?;
        define_exit(linker)
    })
}

fn define_scheduler(linker: &mut Linker<RunContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            RUNTIME_NAMESPACE,
            SCHEDULE_CALLBACK,
            |mut caller: Caller<'_, RunContext>, delay_ms: f64| {
                let id = caller.data_mut().schedule_callback(delay_ms);
                trace!(id, delay_ms, "Callback scheduled");
                id
            },
        )
        .map_err(|e| registration_failed(SCHEDULE_CALLBACK, &e))?;

    linker
        .func_wrap(
            RUNTIME_NAMESPACE,
            CLEAR_CALLBACK,
            |mut caller: Caller<'_, RunContext>, id: i32| {
                let removed = caller.data_mut().callbacks_mut().cancel(id);
                trace!(id, removed, "Callback cleared");
                i32::from(removed)
            },
        )
        .map_err(|e| registration_failed(CLEAR_CALLBACK, &e))?;

    Ok(())
}

fn define_exit(linker: &mut Linker<RunContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            RUNTIME_NAMESPACE,
            EXIT,
            |mut caller: Caller<'_, RunContext>, code: i32| -> wasmtime::Result<()> {
                debug!(code, "Module requested exit");
                caller.data_mut().request_exit(code);

                // Unwinds the guest; the runner recognises the payload
                Err(wasmtime::Error::new(I32Exit(code)))
            },
        )
        .map_err(|e| registration_failed(EXIT, &e))?;

    Ok(())
}

fn registration_failed(name: &str, err: &wasmtime::Error) -> RuntimeError {
    RuntimeError::invalid_config(format!(
        "Failed to register {RUNTIME_NAMESPACE}::{name}: {err}"
    ))
}
