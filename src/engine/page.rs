//! On-disk page framing: a CRC32-checked header plus opaque payload bytes.
//!
//! This is a direct generalization of the teacher's `recovery::wasp::page` module:
//! same header shape and checksum discipline, widened to a 64-bit `data_len` since a
//! payload here may be an entire sub-database snapshot rather than a fixed 16 KB slot.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};

/// Page type tag: a full key/value snapshot of one sub-database.
pub const PAGE_TYPE_SNAPSHOT: u8 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageHeader {
    pub page_id: u64,
    pub version: u64,
    pub page_type: u8,
    pub data_len: u64,
    pub crc32: u32,
}

impl PageHeader {
    #[must_use]
    pub const fn new(page_id: u64, version: u64, page_type: u8, data_len: u64) -> Self {
        Self { page_id, version, page_type, data_len, crc32: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub header: PageHeader,
    pub data: Vec<u8>,
}

impl Page {
    #[must_use]
    pub fn new(page_id: u64, version: u64, page_type: u8, data: Vec<u8>) -> Self {
        let mut header = PageHeader::new(page_id, version, page_type, data.len() as u64);
        header.crc32 = Self::checksum(&header, &data);
        Self { header, data }
    }

    fn checksum(header: &PageHeader, data: &[u8]) -> u32 {
        let mut zeroed = *header;
        zeroed.crc32 = 0;
        let mut hasher = Crc32Hasher::new();
        if let Ok(hdr_bytes) = encode_to_vec(zeroed, standard()) {
            hasher.update(&hdr_bytes);
        }
        hasher.update(data);
        hasher.finalize()
    }

    #[must_use]
    pub fn verify_crc(&self) -> bool {
        Self::checksum(&self.header, &self.data) == self.header.crc32
    }

    /// # Errors
    /// Returns an error if bincode serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_to_vec(self, standard()).map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// # Errors
    /// Returns an error if bincode deserialization fails or the CRC does not match.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (page, _): (Self, usize) =
            decode_from_slice(bytes, standard()).map_err(|e| StoreError::Codec(e.to_string()))?;
        if !page.verify_crc() {
            return Err(StoreError::StoreCorrupt("page checksum mismatch".to_string()));
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_detects_corruption() {
        let page = Page::new(7, 3, PAGE_TYPE_SNAPSHOT, b"hello world".to_vec());
        let bytes = page.to_bytes().unwrap();
        let back = Page::from_bytes(&bytes).unwrap();
        assert_eq!(back.data, b"hello world");
        assert_eq!(back.header.version, 3);

        let mut corrupted = bytes.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        assert!(Page::from_bytes(&corrupted).is_err());
    }
}
