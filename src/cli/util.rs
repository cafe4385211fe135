//! Small parsing helpers shared by [`super::runner`] and the `ledgerlite` binary.

use crate::errors::{Result, StoreError};

/// Decodes a hex-encoded CLI argument into raw bytes.
///
/// # Errors
/// Returns [`StoreError::StoreCorrupt`] if `s` is not valid hex.
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| StoreError::StoreCorrupt(format!("invalid hex argument {s:?}: {e}")))
}
