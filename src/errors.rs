use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error kinds surfaced by the store and MMR layers (spec.md §7).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Normal, expected signal from a map `get`/`contains` on an absent key.
    #[error("key not found")]
    NotFound,

    /// Sequence index outside `[0, length)`.
    #[error("index {index} out of range (length {length})")]
    OutOfRange { index: i64, length: usize },

    /// Constant-length sequence given a value of the wrong size.
    #[error("expected value of length {expected}, got {actual}")]
    BadLength { expected: usize, actual: usize },

    /// Codec saw a leading byte it doesn't recognize.
    #[error("unknown tag byte: {0:#x}")]
    UnknownTag(u8),

    /// A container-reference variant named a container with no sidecar on disk.
    #[error("unknown container name: {0}")]
    UnknownName(String),

    /// Sidecar inconsistent, a page failed to parse, or a reference dangled.
    #[error("store corrupt: {0}")]
    StoreCorrupt(String),

    /// I/O or transaction failure from the underlying page engine.
    #[error("engine error: {0}")]
    EngineError(#[from] std::io::Error),

    /// Serialization failure (bincode) while encoding/decoding a page or submap.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
