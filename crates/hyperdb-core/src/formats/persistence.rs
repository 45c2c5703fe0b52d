//! # Flat Store File Format
//!
//! A flat store is one file: the 5-byte HDBF header followed by the
//! postcard encoding of the store's `key -> record bytes` map.
//!
//! ```text
//! offset 0..4  "HDBF"
//! offset 4     file layout version
//! offset 5..   postcard map
//! ```
//!
//! Readers check the file size and the header before touching the map.

use crate::primitives::{FLAT_MAGIC, MAX_STORE_FILE_SIZE, STORE_FORMAT_VERSION};
use crate::types::HyperdbError;
use std::collections::BTreeMap;

/// Bytes taken by the HDBF header.
pub const HEADER_LEN: usize = FLAT_MAGIC.len() + 1;

// =============================================================================
// HDBF HEADER
// =============================================================================

/// The decoded HDBF header. Only the layout version varies between files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub version: u8,
}

impl StoreHeader {
    /// The header this build writes.
    pub const CURRENT: Self = Self {
        version: STORE_FORMAT_VERSION,
    };

    #[must_use]
    pub fn encode(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..FLAT_MAGIC.len()].copy_from_slice(FLAT_MAGIC);
        out[FLAT_MAGIC.len()] = self.version;
        out
    }

    /// Decode the leading header of `bytes`, accepting only the current
    /// layout version.
    pub fn decode(bytes: &[u8]) -> Result<Self, HyperdbError> {
        let Some((magic, rest)) = bytes.split_first_chunk::<4>() else {
            return Err(HyperdbError::Serialization(format!(
                "flat store is {} bytes, shorter than its header",
                bytes.len()
            )));
        };
        if magic != FLAT_MAGIC {
            return Err(HyperdbError::Serialization(
                "not a flat store: missing HDBF magic".to_string(),
            ));
        }
        let Some(&version) = rest.first() else {
            return Err(HyperdbError::Serialization(
                "flat store header has no version byte".to_string(),
            ));
        };
        if version != STORE_FORMAT_VERSION {
            return Err(HyperdbError::Serialization(format!(
                "flat store layout v{} is not supported by this build (v{})",
                version, STORE_FORMAT_VERSION
            )));
        }
        Ok(Self { version })
    }
}

// =============================================================================
// WHOLE-FILE ENCODING
// =============================================================================

/// Encode a store's records as a complete flat store file.
pub fn store_to_bytes(records: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, HyperdbError> {
    let payload =
        postcard::to_stdvec(records).map_err(|e| HyperdbError::Serialization(e.to_string()))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&StoreHeader::CURRENT.encode());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a complete flat store file.
pub fn store_from_bytes(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, HyperdbError> {
    if bytes.len() > MAX_STORE_FILE_SIZE {
        return Err(HyperdbError::Serialization(format!(
            "flat store of {} bytes is over the {} byte limit",
            bytes.len(),
            MAX_STORE_FILE_SIZE
        )));
    }
    StoreHeader::decode(bytes)?;
    postcard::from_bytes(&bytes[HEADER_LEN..])
        .map_err(|e| HyperdbError::Serialization(format!("flat store records: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let bytes = StoreHeader::CURRENT.encode();
        assert_eq!(&bytes[..4], b"HDBF");
        assert_eq!(bytes[4], STORE_FORMAT_VERSION);
        assert_eq!(StoreHeader::decode(&bytes).expect("decode"), StoreHeader::CURRENT);
    }

    #[test]
    fn records_survive_a_rewrite() {
        let mut records = BTreeMap::new();
        records.insert("1".to_string(), vec![1, 2, 3]);
        records.insert("2".to_string(), Vec::new());

        let first = store_to_bytes(&records).expect("encode");
        let restored = store_from_bytes(&first).expect("decode");
        assert_eq!(restored, records);
        assert_eq!(store_to_bytes(&restored).expect("encode again"), first);
    }

    #[test]
    fn foreign_or_short_files_rejected() {
        let mut foreign = vec![0u8; 10];
        foreign[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(store_from_bytes(&foreign), Err(HyperdbError::Serialization(_))));
        assert!(store_from_bytes(b"HDB").is_err());
        assert!(store_from_bytes(b"HDBF").is_err());

        let mut newer = StoreHeader::CURRENT.encode().to_vec();
        newer[4] = STORE_FORMAT_VERSION.wrapping_add(1);
        assert!(matches!(StoreHeader::decode(&newer), Err(HyperdbError::Serialization(_))));
    }
}
