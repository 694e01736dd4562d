//! Fixed-layout persistence records.
//!
//! The index stores two kinds of values, both with an explicit byte layout
//! that is independent of the storage backend:
//!
//! * fingerprint records — key: 8-byte little-endian hash; value: 12 bytes,
//!   `resource_id`, `t` and `f` each as little-endian u32;
//! * resource metadata — key: 8-byte little-endian resource id; value:
//!   4-byte f32 duration, 4-byte u32 print count, then the UTF-8 path.

use crate::error::{Result, StoreError};

pub const PRINT_VALUE_LEN: usize = 12;

/// One stored fingerprint occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub hash: u64,
    pub resource_id: u32,
    /// Anchor time of the fingerprint, in analysis frames.
    pub t: u32,
    /// Anchor frequency bin.
    pub f: u32,
}

/// Per-resource bookkeeping, stored next to the prints.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMetadata {
    pub resource_id: u32,
    pub duration_seconds: f32,
    pub print_count: u32,
    pub path: String,
}

pub fn encode_print_value(record: &FingerprintRecord) -> [u8; PRINT_VALUE_LEN] {
    let mut value = [0u8; PRINT_VALUE_LEN];
    value[0..4].copy_from_slice(&record.resource_id.to_le_bytes());
    value[4..8].copy_from_slice(&record.t.to_le_bytes());
    value[8..12].copy_from_slice(&record.f.to_le_bytes());
    value
}

pub fn decode_print_value(hash: u64, value: &[u8]) -> Result<FingerprintRecord> {
    if value.len() != PRINT_VALUE_LEN {
        return Err(StoreError::Corrupt(format!(
            "print value has {} bytes, expected {}",
            value.len(),
            PRINT_VALUE_LEN
        )));
    }
    let word = |i: usize| u32::from_le_bytes([value[i], value[i + 1], value[i + 2], value[i + 3]]);
    Ok(FingerprintRecord {
        hash,
        resource_id: word(0),
        t: word(4),
        f: word(8),
    })
}

pub fn encode_metadata_value(meta: &ResourceMetadata) -> Vec<u8> {
    let mut value = Vec::with_capacity(8 + meta.path.len());
    value.extend_from_slice(&meta.duration_seconds.to_le_bytes());
    value.extend_from_slice(&meta.print_count.to_le_bytes());
    value.extend_from_slice(meta.path.as_bytes());
    value
}

pub fn decode_metadata_value(resource_id: u32, value: &[u8]) -> Result<ResourceMetadata> {
    if value.len() < 8 {
        return Err(StoreError::Corrupt(format!(
            "metadata value has {} bytes, expected at least 8",
            value.len()
        )));
    }
    let duration_seconds = f32::from_le_bytes([value[0], value[1], value[2], value[3]]);
    let print_count = u32::from_le_bytes([value[4], value[5], value[6], value[7]]);
    let path = std::str::from_utf8(&value[8..])
        .map_err(|e| StoreError::Corrupt(format!("metadata path is not UTF-8: {e}")))?
        .to_string();
    Ok(ResourceMetadata {
        resource_id,
        duration_seconds,
        print_count,
        path,
    })
}

/// Stable identifier for a resource, derived from its file name with FNV-1a
/// and masked positive. Re-indexing the same file always yields the same id,
/// which is what makes store and delete idempotent per file.
pub fn resource_id(path: &str) -> u32 {
    let name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash & 0x7fff_ffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_value_roundtrip() {
        let record = FingerprintRecord {
            hash: 0x3_1234_5678,
            resource_id: 42,
            t: 1_000_000,
            f: 307,
        };
        let value = encode_print_value(&record);
        assert_eq!(decode_print_value(record.hash, &value).unwrap(), record);
    }

    #[test]
    fn test_truncated_print_value_is_corrupt() {
        let err = decode_print_value(1, &[0u8; 7]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = ResourceMetadata {
            resource_id: 99,
            duration_seconds: 187.5,
            print_count: 4321,
            path: "library/track.wav".to_string(),
        };
        let value = encode_metadata_value(&meta);
        assert_eq!(decode_metadata_value(99, &value).unwrap(), meta);
    }

    #[test]
    fn test_resource_id_is_stable_and_positive() {
        let a = resource_id("some/dir/track.wav");
        let b = resource_id("other/place/track.wav");
        // Only the file name matters, so a moved file keeps its id.
        assert_eq!(a, b);
        assert!(a <= i32::MAX as u32);
        assert_ne!(resource_id("track.wav"), resource_id("other.wav"));
    }
}
