//! Module loading, instantiation and the run loop.
//!
//! This module provides [`Loader`], which takes a module from bytes on disk
//! to a finished run:
//!
//! 1. [`Loader::load`] reads the image through the filesystem capability
//! 2. [`Loader::instantiate`] validates it, checks every import against the
//!    import object, and instantiates it in a fresh store
//! 3. [`RunHandle::run`] calls the entry point, then delivers scheduled
//!    callbacks until the module exits or none remain

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Instance, Store, Trap, TypedFunc};
use wasmtime_wasi::I32Exit;

use crate::WasmEngine;
use crate::capability::CapabilitySet;
use crate::events::MAX_DELAY_MS;
use crate::imports::ImportObject;
use crate::module::{CompiledModule, ModuleImage};
use crate::store::{
    RunContext, RunMetrics, calculate_fuel_consumed, create_store, get_remaining_fuel,
};
use shimrun_common::{ExecutionConfig, RuntimeError};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The entry point returned and no callbacks remained.
    Completed {
        /// Metrics for the run.
        metrics: RunMetrics,
    },

    /// The module called the exit callback.
    Exited {
        /// Status the module passed.
        code: i32,
        /// Metrics for the run.
        metrics: RunMetrics,
    },
}

impl RunOutcome {
    /// The module's exit status (`0` for a completed run).
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed { .. } => 0,
            RunOutcome::Exited { code, .. } => *code,
        }
    }

    /// Returns `true` if the run ended with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// Status for the host process.
    ///
    /// Statuses outside `0..=255` cannot be represented and become `1`.
    pub fn process_status(&self) -> u8 {
        u8::try_from(self.exit_code()).unwrap_or(1)
    }

    /// Metrics for the run.
    pub fn metrics(&self) -> &RunMetrics {
        match self {
            RunOutcome::Completed { metrics } | RunOutcome::Exited { metrics, .. } => metrics,
        }
    }
}

/// Loads and instantiates modules.
///
/// # Thread Safety
///
/// `Loader` holds only the shared engine and configuration. Each
/// instantiation gets its own [`Store`], so instances never share linear
/// memory or tables.
#[derive(Debug, Clone)]
pub struct Loader {
    engine: WasmEngine,
    config: ExecutionConfig,
}

impl Loader {
    /// Create a loader.
    pub fn new(engine: WasmEngine, config: ExecutionConfig) -> Self {
        Self { engine, config }
    }

    /// Get the engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// Read the module image at `path` through the filesystem capability.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] if the file is missing or unreadable.
    pub fn load(
        &self,
        capabilities: &CapabilitySet,
        path: impl AsRef<Path>,
    ) -> Result<ModuleImage, RuntimeError> {
        ModuleImage::load(capabilities.filesystem(), path)
    }

    /// Validate, link and instantiate `image`.
    ///
    /// `imports` is passed to Wasmtime unmodified. No [`RunHandle`] exists
    /// unless every step succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The bytes are not a valid module ([`RuntimeError::Validation`])
    /// - An import is missing from `imports` ([`RuntimeError::Link`])
    /// - Wasmtime rejects the linked module or its start function traps
    #[instrument(skip_all, fields(content_hash = %image.content_hash()))]
    pub async fn instantiate(
        &self,
        image: &ModuleImage,
        imports: &ImportObject,
        capabilities: &Arc<CapabilitySet>,
    ) -> Result<RunHandle, RuntimeError> {
        let compiled = CompiledModule::from_image(self.engine.inner(), image)?;
        self.instantiate_compiled(&compiled, imports, capabilities)
            .await
    }

    /// Link and instantiate an already compiled module.
    ///
    /// # Errors
    ///
    /// Same as [`instantiate`](Self::instantiate), minus validation.
    pub async fn instantiate_compiled(
        &self,
        module: &CompiledModule,
        imports: &ImportObject,
        capabilities: &Arc<CapabilitySet>,
    ) -> Result<RunHandle, RuntimeError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let context = RunContext::new(Arc::clone(capabilities), run_id.clone());
        let mut store = create_store(&self.engine, &self.config, context)?;
        let initial_fuel = get_remaining_fuel(&store).unwrap_or(0);

        if let Some((namespace, name)) = imports.first_missing(&mut store, module.inner()) {
            error!(%run_id, %namespace, %name, "Import not provided");
            return Err(RuntimeError::link(namespace, name));
        }

        debug!(%run_id, "Imports resolved, instantiating");

        let instance = imports
            .linker()
            .instantiate_async(&mut store, module.inner())
            .await
            .map_err(|e| {
                if e.downcast_ref::<Trap>().is_some() {
                    let (message, code) = extract_trap_info(&e);
                    RuntimeError::trap(message, code)
                } else {
                    RuntimeError::instantiation(format!("{e:#}"))
                }
            })?;

        info!(%run_id, content_hash = %module.content_hash(), "Module instantiated");

        Ok(RunHandle {
            store,
            instance,
            entry_point: self.config.entry_point.clone(),
            callback_export: self.config.callback_export.clone(),
            initial_fuel,
        })
    }
}

/// One instantiated module, ready to run.
pub struct RunHandle {
    store: Store<RunContext>,
    instance: Instance,
    entry_point: String,
    callback_export: String,
    initial_fuel: u64,
}

impl RunHandle {
    /// The run's context.
    pub fn context(&self) -> &RunContext {
        self.store.data()
    }

    /// The run identifier.
    pub fn run_id(&self) -> &str {
        &self.store.data().run_id
    }

    /// Transfer control to the module.
    ///
    /// Calls the entry point, then repeatedly waits for the earliest
    /// scheduled callback and delivers it through the callback export.
    /// Returns once the module calls the exit callback or the entry point
    /// has returned with nothing left scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The entry point (or, with callbacks pending, the callback export)
    ///   is missing
    /// - The module traps or exhausts its fuel
    /// - A capability fails inside a host function
    #[instrument(skip(self), fields(run_id = %self.run_id(), entry_point = %self.entry_point))]
    pub async fn run(mut self) -> Result<RunOutcome, RuntimeError> {
        let entry: TypedFunc<(), ()> = self
            .instance
            .get_typed_func(&mut self.store, &self.entry_point)
            .map_err(|_| RuntimeError::missing_export(self.entry_point.clone()))?;

        debug!("Executing entry point");

        let result = entry.call_async(&mut self.store, ()).await;
        if let Some(code) = self.settle(result)? {
            return Ok(self.finish(Some(code)));
        }

        let mut resume: Option<TypedFunc<i32, ()>> = None;

        while let Some(callback) = self.store.data_mut().callbacks_mut().pop_next() {
            let func = match resume.take() {
                Some(func) => func,
                None => self
                    .instance
                    .get_typed_func::<i32, ()>(&mut self.store, &self.callback_export)
                    .map_err(|_| RuntimeError::missing_export(self.callback_export.clone()))?,
            };

            let now = self.store.data().capabilities().monotonic_clock_millis();
            if let Some(wait) = wait_duration(callback.deadline_ms - now) {
                tokio::time::sleep(wait).await;
            }

            debug!(callback_id = callback.id, "Delivering callback");

            let result = func.call_async(&mut self.store, callback.id).await;
            self.store.data_mut().metrics.callbacks_fired += 1;
            resume = Some(func);

            if let Some(code) = self.settle(result)? {
                return Ok(self.finish(Some(code)));
            }
        }

        Ok(self.finish(None))
    }

    /// Turn a call result into an exit status (if the module exited) or an
    /// error.
    fn settle(&mut self, result: wasmtime::Result<()>) -> Result<Option<i32>, RuntimeError> {
        let err = match result {
            Ok(()) => return Ok(self.store.data().exit_code()),
            Err(err) => err,
        };

        if let Some(exit) = err.downcast_ref::<I32Exit>() {
            self.store.data_mut().request_exit(exit.0);
            return Ok(self.store.data().exit_code());
        }

        if is_out_of_fuel(&err) {
            warn!(
                fuel_consumed = calculate_fuel_consumed(self.initial_fuel, &self.store),
                "Execution terminated: fuel exhausted"
            );
            return Err(RuntimeError::FuelExhausted);
        }

        let (message, code) = extract_trap_info(&err);

        // Capability failures raised inside host functions keep their type
        match err.downcast::<RuntimeError>() {
            Ok(runtime_error) => {
                error!(error = %runtime_error, "Host function failed");
                Err(runtime_error)
            }
            Err(_) => {
                error!(trap_message = %message, "Execution trapped");
                Err(RuntimeError::trap(message, code))
            }
        }
    }

    fn finish(mut self, exit_code: Option<i32>) -> RunOutcome {
        let fuel_consumed = calculate_fuel_consumed(self.initial_fuel, &self.store);
        let ctx = self.store.data_mut();
        ctx.metrics.fuel_consumed = fuel_consumed;
        ctx.finalize_metrics();

        let metrics = ctx.metrics.clone();
        let pending = ctx.callbacks().len();
        let duration_ms = metrics.duration.unwrap_or_default().as_millis();

        match exit_code {
            Some(code) => {
                info!(
                    code,
                    duration_ms,
                    callbacks_fired = metrics.callbacks_fired,
                    abandoned_callbacks = pending,
                    "Module exited"
                );
                RunOutcome::Exited { code, metrics }
            }
            None => {
                info!(
                    duration_ms,
                    callbacks_fired = metrics.callbacks_fired,
                    "Module completed"
                );
                RunOutcome::Completed { metrics }
            }
        }
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id())
            .field("entry_point", &self.entry_point)
            .field("callback_export", &self.callback_export)
            .finish_non_exhaustive()
    }
}

/// Time left until a deadline `wait_ms` away, capped at
/// [`MAX_DELAY_MS`]. `None` when the deadline has passed.
fn wait_duration(wait_ms: f64) -> Option<Duration> {
    if wait_ms.is_nan() || wait_ms <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(wait_ms.min(MAX_DELAY_MS) / 1000.0).ok()
}

/// Extract human-readable trap information.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    let message = format!("{error:#}");

    // Try to get the trap code
    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));

    (message, code)
}

/// Check if an error is due to fuel exhaustion.
fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}
