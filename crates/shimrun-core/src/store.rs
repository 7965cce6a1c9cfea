//! Per-run execution context and store management.
//!
//! This module provides:
//! - [`RunContext`]: State reachable from host functions during one run
//! - [`RunMetrics`]: Counters collected while the module runs
//! - [`create_store`]: A fresh Wasmtime store around a context

use std::sync::Arc;
use std::time::{Duration, Instant};

use wasmtime::Store;

use crate::WasmEngine;
use crate::capability::CapabilitySet;
use crate::events::CallbackQueue;
use shimrun_common::{ExecutionConfig, RuntimeError};

/// Per-run execution context.
///
/// Host functions reach this through [`wasmtime::Caller::data`]. It owns
/// the callback queue and the exit status and shares the read-only
/// capability set.
pub struct RunContext {
    /// Capabilities installed for this run.
    capabilities: Arc<CapabilitySet>,

    /// Unique run identifier for tracing.
    pub run_id: String,

    /// Callbacks the module has asked for.
    callbacks: CallbackQueue,

    /// Status passed to the exit callback, once called.
    exit_code: Option<i32>,

    /// Execution metrics.
    pub metrics: RunMetrics,

    /// Execution start time.
    start_time: Instant,
}

/// Execution metrics.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    /// Fuel consumed during the run (zero without fuel metering).
    pub fuel_consumed: u64,

    /// Callbacks delivered to the module.
    pub callbacks_fired: u64,

    /// Total run duration, set when the run finishes.
    pub duration: Option<Duration>,
}

impl RunContext {
    /// Create a context sharing `capabilities`.
    pub fn new(capabilities: Arc<CapabilitySet>, run_id: String) -> Self {
        Self {
            capabilities,
            run_id,
            callbacks: CallbackQueue::new(),
            exit_code: None,
            metrics: RunMetrics::default(),
            start_time: Instant::now(),
        }
    }

    /// The capability set.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Pending callbacks.
    pub fn callbacks(&self) -> &CallbackQueue {
        &self.callbacks
    }

    /// Pending callbacks, mutably.
    pub fn callbacks_mut(&mut self) -> &mut CallbackQueue {
        &mut self.callbacks
    }

    /// Schedule a callback `delay_ms` from now on the capability clock.
    pub fn schedule_callback(&mut self, delay_ms: f64) -> i32 {
        let now = self.capabilities.monotonic_clock_millis();
        self.callbacks.schedule(now, delay_ms)
    }

    /// Record the module's exit status. The first status wins.
    pub fn request_exit(&mut self, code: i32) {
        self.exit_code.get_or_insert(code);
    }

    /// Status passed to the exit callback, if it has been called.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Get elapsed time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finalize metrics after execution.
    pub fn finalize_metrics(&mut self) {
        self.metrics.duration = Some(self.elapsed());
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("pending_callbacks", &self.callbacks.len())
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

/// Create a new Wasmtime store around `context`.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    context: RunContext,
) -> Result<Store<RunContext>, RuntimeError> {
    let mut store = Store::new(engine.inner(), context);

    // Set fuel limit if metering is enabled
    if engine.is_fuel_metered() {
        store
            .set_fuel(config.max_fuel)
            .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;
    }

    Ok(store)
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<RunContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<RunContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
