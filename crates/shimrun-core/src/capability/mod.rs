//! The capability set a module's runtime glue depends on.
//!
//! A browser gives the glue these primitives as globals. Here they are an
//! explicit [`CapabilitySet`], built once at startup, shared behind an
//! [`Arc`], and reached by host functions through the store's
//! [`RunContext`](crate::RunContext). Nothing is looked up ambiently, so any
//! entry can be replaced with a fake before the set is built.
//!
//! | Capability | Trait / type |
//! |------------|--------------|
//! | `secureRandom` | [`SecureRandom`] |
//! | `monotonicClockMillis` | [`MonotonicClock`] |
//! | `textEncoder` / `textDecoder` | [`TextCodec`] |
//! | `filesystem` | [`Filesystem`] |

pub mod clock;
pub mod codec;
pub mod fs;
pub mod random;

use std::sync::Arc;

use shimrun_common::{CapabilityConfig, DecodePolicy, RuntimeError};

pub use clock::{InstantClock, ManualClock, MonotonicClock};
pub use codec::{TextCodec, TextDecoder, TextEncoder};
pub use fs::{Filesystem, MemoryFilesystem, NativeFilesystem};
pub use random::{OsRandom, SecureRandom};

/// Name of the random-byte filler.
pub const SECURE_RANDOM: &str = "secureRandom";

/// Name of the monotonic clock.
pub const MONOTONIC_CLOCK_MILLIS: &str = "monotonicClockMillis";

/// Name of the encoder constructor.
pub const TEXT_ENCODER: &str = "textEncoder";

/// Name of the decoder constructor.
pub const TEXT_DECODER: &str = "textDecoder";

/// Name of the filesystem handle.
pub const FILESYSTEM: &str = "filesystem";

/// Every capability, in installation order.
pub const ALL: [&str; 5] = [
    SECURE_RANDOM,
    MONOTONIC_CLOCK_MILLIS,
    TEXT_ENCODER,
    TEXT_DECODER,
    FILESYSTEM,
];

/// Immutable mapping from capability to implementation.
///
/// Bindings cannot be replaced once built; the module runtime may cache
/// anything it obtains from them.
#[derive(Clone)]
pub struct CapabilitySet {
    random: Arc<dyn SecureRandom>,
    clock: Arc<dyn MonotonicClock>,
    codec: TextCodec,
    filesystem: Arc<dyn Filesystem>,
}

impl CapabilitySet {
    /// Build the native capability set: OS RNG, [`Instant`](std::time::Instant)
    /// clock, native file I/O.
    pub fn native(config: &CapabilityConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Create a builder whose defaults are the native implementations.
    pub fn builder() -> CapabilitySetBuilder {
        CapabilitySetBuilder::default()
    }

    /// The text codec constructor pair.
    pub fn codec(&self) -> TextCodec {
        self.codec
    }

    /// The filesystem handle.
    pub fn filesystem(&self) -> &dyn Filesystem {
        self.filesystem.as_ref()
    }

    /// Fill `buf` with secure random bytes.
    pub fn secure_random(&self, buf: &mut [u8]) -> Result<(), RuntimeError> {
        self.random.fill(buf)
    }

    /// Read the monotonic clock.
    pub fn monotonic_clock_millis(&self) -> f64 {
        self.clock.now_millis()
    }

    /// A new UTF-8 encoder.
    pub fn text_encoder(&self) -> TextEncoder {
        self.codec.encoder()
    }

    /// A new UTF-8 decoder.
    pub fn text_decoder(&self) -> TextDecoder {
        self.codec.decoder()
    }
}

impl std::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("capabilities", &ALL)
            .field("decode_policy", &self.codec.policy())
            .finish_non_exhaustive()
    }
}

/// Builder for [`CapabilitySet`].
///
/// Any capability left unset gets its native implementation.
#[derive(Default)]
pub struct CapabilitySetBuilder {
    random: Option<Arc<dyn SecureRandom>>,
    clock: Option<Arc<dyn MonotonicClock>>,
    decode_policy: DecodePolicy,
    filesystem: Option<Arc<dyn Filesystem>>,
}

impl CapabilitySetBuilder {
    /// Apply settings from configuration.
    #[must_use]
    pub fn config(mut self, config: &CapabilityConfig) -> Self {
        self.decode_policy = config.decode_policy;
        if let Some(root) = config.fs_root() {
            self.filesystem = Some(Arc::new(NativeFilesystem::with_root(root)));
        }
        self
    }

    /// Use a custom random source.
    #[must_use]
    pub fn random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.random = Some(random);
        self
    }

    /// Use a custom clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn MonotonicClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the decode policy.
    #[must_use]
    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Use a custom filesystem.
    #[must_use]
    pub fn filesystem(mut self, filesystem: Arc<dyn Filesystem>) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    /// Build the set.
    pub fn build(self) -> CapabilitySet {
        CapabilitySet {
            random: self.random.unwrap_or_else(|| Arc::new(OsRandom)),
            clock: self.clock.unwrap_or_else(|| Arc::new(InstantClock::new())),
            codec: TextCodec::new(self.decode_policy),
            filesystem: self
                .filesystem
                .unwrap_or_else(|| Arc::new(NativeFilesystem::new())),
        }
    }
}
