//! Error types for shimrun.
//!
//! Every failure in the bootstrap is terminal: the module is either brought
//! fully online or not at all. [`RuntimeError`] is the single taxonomy that
//! flows from the capability shim, the loader, and the runner up to the
//! process entry point.

use std::io;

use thiserror::Error;

/// Top-level runtime errors.
///
/// These errors represent failures that can occur during the lifecycle of
/// a module, from reading its image to draining its last callback.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A file (the module image or a file requested by the guest) is
    /// missing or unreadable.
    #[error("IO error reading '{path}': {source}")]
    Io {
        /// The path that could not be read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The module bytes are not a structurally valid WebAssembly module.
    #[error("Validation failed: {reason}")]
    Validation {
        /// Description of the validation failure.
        reason: String,
    },

    /// An import required by the module has no entry in the import object.
    #[error("Link error: missing import `{module}::{name}`")]
    Link {
        /// Import namespace.
        module: String,
        /// Import name.
        name: String,
    },

    /// The engine refused to instantiate a fully linked module
    /// (e.g. an import with the wrong signature).
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Description of the failure.
        reason: String,
    },

    /// Text did not conform to UTF-8 under the strict decode policy.
    #[error("Encoding error: {reason}")]
    Encoding {
        /// Description of the malformed input.
        reason: String,
    },

    /// A required export (entry point or callback) is absent or mistyped.
    #[error("Missing export: {name}")]
    MissingExport {
        /// The export name.
        name: String,
    },

    /// A WebAssembly trap occurred during execution.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// A capability could not perform its operation (e.g. the OS RNG failed).
    #[error("Capability '{name}' failed: {reason}")]
    Capability {
        /// The capability name.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl RuntimeError {
    /// Create a new `Io` error for the given path.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a new `Validation` error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a new `Link` error.
    pub fn link(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Link {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `Encoding` error.
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Create a new `MissingExport` error.
    pub fn missing_export(name: impl Into<String>) -> Self {
        Self::MissingExport { name: name.into() }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Trap {
            message: message.into(),
            code,
        }
    }

    /// Create a new `Capability` error.
    pub fn capability(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Capability {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates a failed link.
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link { .. })
    }

    /// Process exit status for this error.
    ///
    /// Always non-zero. Distinct classes get distinct codes so wrapper
    /// scripts can tell a bad image from a guest crash.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Io { .. } => 66,
            Self::Validation { .. } => 65,
            Self::Link { .. } | Self::Instantiation { .. } | Self::MissingExport { .. } => 69,
            Self::InvalidConfig { .. } => 78,
            Self::Encoding { .. }
            | Self::Trap { .. }
            | Self::FuelExhausted
            | Self::Capability { .. } => 70,
        }
    }
}
