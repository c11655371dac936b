//! The umbrella error taxonomy callers see.

use std::borrow::Cow;
use tiercache_backend::BackendError;
use tiercache_codec::CodecError;
use tiercache_events::BusError;
use tiercache_guard::GuardError;
use tiercache_vault::VaultError;

/// Anything a cache operation can surface.
///
/// Propagation policy:
/// * [`CacheError::Application`]: raised by the user's loader, passed
///   through unchanged, never cached, never classified.
/// * Integrity-class failures (checksum, AEAD tag, serializer mismatch)
///   are treated as misses on the hot read path and only surface from
///   explicit decode operations.
/// * Availability-class failures (circuit open, timeout, backpressure,
///   transient backend errors) are subject to the configured
///   [`crate::FallbackPolicy`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Invalid configuration, detected at construction time.
    #[error("invalid cache configuration: {reason}")]
    Configuration { reason: Cow<'static, str> },

    /// The user's computation failed. Forwarded as-is.
    #[error("loader failed: {source}")]
    Application {
        #[source]
        source: anyhow::Error,
    },

    /// Envelope framing or serializer failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Encryption layer failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Reliability envelope rejection or guarded backend failure.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Unguarded backend failure (lock coordination paths).
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalidation bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl CacheError {
    /// Whether the configured fallback policy applies: the cache layer
    /// (not the caller's input and not the loader) failed to deliver.
    #[must_use]
    pub fn is_availability(&self) -> bool {
        match self {
            Self::Guard(err) => err.is_availability(),
            Self::Backend(err) => err.is_transient(),
            Self::Codec(CodecError::SizeLimitExceeded { .. }) => true,
            _ => false,
        }
    }

    /// Short label for the errors-by-kind counter.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Application { .. } => "application",
            Self::Codec(CodecError::IntegrityError { .. }) => "integrity",
            Self::Codec(CodecError::SerializerMismatch { .. }) => "serializer_mismatch",
            Self::Codec(CodecError::SizeLimitExceeded { .. }) => "size_limit",
            Self::Codec(_) => "codec",
            Self::Vault(_) => "decryption",
            Self::Guard(GuardError::CircuitOpen { .. }) => "circuit_open",
            Self::Guard(GuardError::BackpressureRejected { .. }) => "backpressure",
            Self::Guard(GuardError::Timeout { .. }) => "timeout",
            Self::Guard(_) => "backend",
            Self::Backend(_) => "backend",
            Self::Bus(_) => "bus",
        }
    }
}
