//! Backend error taxonomy.
//!
//! The reliability envelope keys its breaker decisions off
//! [`BackendErrorKind::is_transient`], so the split between transient and
//! permanent kinds is behavior, not documentation.

/// What went wrong, from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// Transport-level failure: refused, reset, unreachable.
    Connection,
    /// The operation exceeded its deadline.
    Timeout,
    /// The client-side connection pool had no free handle.
    PoolExhausted,
    /// The server answered but is still warming up / loading its dataset.
    ServerLoading,
    /// Local I/O failure (filesystem backends).
    Io,
    /// Authentication or authorization was rejected.
    Auth,
    /// The peer speaks a different protocol or returned nonsense.
    Protocol,
}

impl BackendErrorKind {
    /// Transient failures advance the circuit breaker; permanent ones are
    /// surfaced as-is without tripping it.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Timeout | Self::PoolExhausted | Self::ServerLoading | Self::Io
        )
    }
}

/// A failed L2 operation with actionable context.
///
/// `key_hint` is an abbreviated key: enough to locate the entry, short
/// enough for log lines. Values never appear here.
#[derive(Debug, thiserror::Error)]
#[error("backend {operation} failed ({kind:?}) for {key_hint:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub operation: &'static str,
    pub key_hint: String,
    pub message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(
        kind: BackendErrorKind,
        operation: &'static str,
        key: &str,
        message: impl Into<String>,
    ) -> Self {
        Self { kind, operation, key_hint: key_hint(key), message: message.into() }
    }

    /// Maps a local I/O failure onto the taxonomy.
    #[must_use]
    pub fn io(operation: &'static str, key: &str, err: &std::io::Error) -> Self {
        Self::new(BackendErrorKind::Io, operation, key, err.to_string())
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Abbreviates a cache key for error messages and logs.
#[must_use]
pub fn key_hint(key: &str) -> String {
    const HINT_LEN: usize = 48;
    if key.len() <= HINT_LEN {
        key.to_owned()
    } else {
        let cut = (0..=HINT_LEN).rev().find(|&i| key.is_char_boundary(i)).unwrap_or(0);
        format!("{}…", &key[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_split() {
        assert!(BackendErrorKind::Connection.is_transient());
        assert!(BackendErrorKind::Timeout.is_transient());
        assert!(BackendErrorKind::PoolExhausted.is_transient());
        assert!(BackendErrorKind::ServerLoading.is_transient());
        assert!(!BackendErrorKind::Auth.is_transient());
        assert!(!BackendErrorKind::Protocol.is_transient());
    }

    #[test]
    fn test_key_hint_truncates() {
        let long = "k".repeat(100);
        let hint = key_hint(&long);
        assert!(hint.chars().count() <= 49);
        assert!(hint.ends_with('…'));
        assert_eq!(key_hint("short"), "short");
    }
}
