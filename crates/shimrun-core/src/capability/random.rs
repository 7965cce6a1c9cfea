//! Secure random byte source.

use shimrun_common::RuntimeError;

use super::SECURE_RANDOM;

/// Fills buffers with cryptographically strong random bytes.
///
/// Implementations must either fill the whole buffer or fail; a partially
/// written buffer is never reported as success.
pub trait SecureRandom: Send + Sync {
    /// Overwrite every byte of `buf`.
    fn fill(&self, buf: &mut [u8]) -> Result<(), RuntimeError>;
}

/// The operating system's RNG (`getrandom(2)`, `BCryptGenRandom`, ...).
///
/// After the kernel pool is initialized this never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RuntimeError> {
        if buf.is_empty() {
            return Ok(());
        }
        getrandom::getrandom(buf).map_err(|e| RuntimeError::capability(SECURE_RANDOM, e.to_string()))
    }
}
