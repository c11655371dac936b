//! Errors that can occur on the invalidation bus.

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Capacity must be greater than zero for the broadcast buffer.
    #[error("invalid bus capacity: {requested}")]
    InvalidCapacity { requested: usize },

    /// An event failed to encode or decode for a remote transport.
    #[error("invalidation event codec failed: {source}")]
    Codec {
        #[from]
        source: postcard::Error,
    },
}
