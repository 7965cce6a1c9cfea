//! UTF-8 text codec.
//!
//! [`TextCodec`] hands out stateless [`TextEncoder`] and [`TextDecoder`]
//! values, mirroring the constructor pair the browser exposes. The encoding
//! is fixed to UTF-8.
//!
//! Malformed input is handled by the configured [`DecodePolicy`]:
//! - `Strict` rejects it with [`RuntimeError::Encoding`]
//! - `Replace` substitutes U+FFFD for each maximal invalid subsequence, the
//!   same substitution the WHATWG decoder performs

use std::borrow::Cow;

use shimrun_common::{DecodePolicy, RuntimeError};

/// Constructor for UTF-8 encoders and decoders sharing one decode policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextCodec {
    policy: DecodePolicy,
}

impl TextCodec {
    /// Create a codec applying `policy` to malformed input.
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    /// The policy every encoder and decoder from this codec applies.
    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Construct an encoder.
    pub fn encoder(&self) -> TextEncoder {
        TextEncoder {
            policy: self.policy,
        }
    }

    /// Construct a decoder.
    pub fn decoder(&self) -> TextDecoder {
        TextDecoder {
            policy: self.policy,
        }
    }
}

/// Unicode text to UTF-8 bytes.
#[derive(Debug, Clone, Copy)]
pub struct TextEncoder {
    policy: DecodePolicy,
}

impl TextEncoder {
    /// Encode text. Always lossless.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    /// Encode into `dst`, returning the number of bytes written, or `None`
    /// if `dst` is too small (nothing is written in that case).
    pub fn encode_into(&self, text: &str, dst: &mut [u8]) -> Option<usize> {
        let bytes = text.as_bytes();
        let target = dst.get_mut(..bytes.len())?;
        target.copy_from_slice(bytes);
        Some(bytes.len())
    }

    /// Encode UTF-16 code units.
    ///
    /// Lone surrogates are the only malformed input and follow the policy.
    pub fn encode_utf16(&self, units: &[u16]) -> Result<Vec<u8>, RuntimeError> {
        let text = match self.policy {
            DecodePolicy::Strict => String::from_utf16(units).map_err(|_| {
                let position = char::decode_utf16(units.iter().copied())
                    .position(|r| r.is_err())
                    .unwrap_or(0);
                RuntimeError::encoding(format!(
                    "unpaired surrogate in UTF-16 input at code unit {position}"
                ))
            })?,
            DecodePolicy::Replace => String::from_utf16_lossy(units),
        };
        Ok(text.into_bytes())
    }
}

/// UTF-8 bytes to Unicode text.
#[derive(Debug, Clone, Copy)]
pub struct TextDecoder {
    policy: DecodePolicy,
}

impl TextDecoder {
    /// Decode `bytes`.
    ///
    /// Borrows when the input is already well-formed.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, RuntimeError> {
        match self.policy {
            DecodePolicy::Strict => std::str::from_utf8(bytes).map(Cow::Borrowed).map_err(|e| {
                RuntimeError::encoding(format!(
                    "invalid UTF-8 sequence at byte offset {}",
                    e.valid_up_to()
                ))
            }),
            DecodePolicy::Replace => Ok(String::from_utf8_lossy(bytes)),
        }
    }

    /// Whether this decoder rejects malformed input.
    pub fn is_fatal(&self) -> bool {
        self.policy == DecodePolicy::Strict
    }
}
