//! shimrun CLI entry point.
//!
//! Runs one WebAssembly module to completion and exits with its status.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shimrun_common::{
    ConfigFile, DecodePolicy, LogConfig, LogFormat, RuntimeConfig, RuntimeError,
};
use shimrun_core::{CapabilitySet, Loader, RunOutcome, WasmEngine};
use shimrun_host::import_object;

/// Run a browser-targeted WebAssembly module outside the browser.
#[derive(Debug, Parser)]
#[command(name = "shimrun", version, about)]
struct Cli {
    /// Module image to run. Falls back to `module` in the config file.
    module: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(short, long, env = "SHIMRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Export called to start the module.
    #[arg(long)]
    entry: Option<String>,

    /// How malformed UTF-8 is decoded: `strict` or `replace`.
    #[arg(long)]
    decode_policy: Option<DecodePolicy>,

    /// Enable fuel metering with this budget.
    #[arg(long)]
    fuel: Option<u64>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut RuntimeConfig) {
        if let Some(entry) = &self.entry {
            config.execution.entry_point.clone_from(entry);
        }
        if let Some(policy) = self.decode_policy {
            config.capabilities.decode_policy = policy;
        }
        if let Some(fuel) = self.fuel {
            config.engine.fuel_metering = true;
            config.execution.max_fuel = fuel;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConfigFile::default(),
    };

    init_tracing(&file.log);

    let mut config = file.runtime;
    cli.apply_overrides(&mut config);

    let module = cli
        .module
        .or_else(|| file.module.map(PathBuf::from))
        .context("No module given on the command line or in the config file")?;

    info!(
        module = %module.display(),
        decode_policy = %config.capabilities.decode_policy,
        fuel_metering = config.engine.fuel_metering,
        "Starting shimrun"
    );

    match run(&module, &config).await {
        Ok(outcome) => Ok(ExitCode::from(outcome.process_status())),
        Err(e) => {
            error!(error = %e, "Run failed");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

/// Build the capabilities and import object, then load, instantiate and run
/// `module`.
async fn run(module: &Path, config: &RuntimeConfig) -> Result<RunOutcome, RuntimeError> {
    let capabilities = Arc::new(CapabilitySet::native(&config.capabilities));
    let engine = WasmEngine::new(&config.engine)?;

    // The shim is complete before the loader touches the module
    let imports = import_object(&engine, &capabilities)?;

    let loader = Loader::new(engine, config.execution.clone());
    let image = loader.load(&capabilities, module)?;
    let handle = loader
        .instantiate(&image, &imports, &capabilities)
        .await?;

    handle.run().await
}

fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));

    // Logs go to stderr so the module owns stdout
    let (text, json) = match log.format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "shimrun",
            "app.wasm",
            "--entry",
            "main",
            "--decode-policy",
            "replace",
            "--fuel",
            "5000",
        ]);
        let mut config = RuntimeConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(cli.module.as_deref(), Some(Path::new("app.wasm")));
        assert_eq!(config.execution.entry_point, "main");
        assert_eq!(config.capabilities.decode_policy, DecodePolicy::Replace);
        assert!(config.engine.fuel_metering);
        assert_eq!(config.execution.max_fuel, 5000);
    }

    #[test]
    fn test_cli_defaults_leave_config() {
        let cli = Cli::parse_from(["shimrun"]);
        let mut config = RuntimeConfig::default();
        cli.apply_overrides(&mut config);

        assert!(cli.module.is_none());
        assert_eq!(config.execution.entry_point, "_start");
        assert!(!config.engine.fuel_metering);
    }

    #[test]
    fn test_cli_rejects_unknown_policy() {
        let result = Cli::try_parse_from(["shimrun", "--decode-policy", "lossy"]);
        assert!(result.is_err());
    }
}
