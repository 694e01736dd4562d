//! The index contract: an ordered multimap from fingerprint hash to
//! occurrences, queried with a fuzzy range around each probe hash.
//!
//! Mutations and queries are batched: callers enqueue on their own handle
//! and the batch hits the backend on `flush_*`. Every handle owns its
//! queues outright, so one handle per worker gives batching without any
//! shared mutable state; cross-handle visibility starts only once
//! `flush_store` returns.

use crate::error::Result;
use crate::record::{FingerprintRecord, ResourceMetadata};
use std::collections::{HashMap, HashSet};

/// Index statistics, as reported by the stats tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub print_count: u64,
    pub resource_count: u64,
    pub total_duration_seconds: u64,
}

/// Storage contract for the fuzzy inverted index.
///
/// `flush_query` returns hits grouped by the probe hash that found them; a
/// stored record is a hit for probe `h` when its hash lies in
/// `[h - range, h + range]`. All `flush_*` calls are no-ops on an empty
/// queue, and `flush_store` only returns after the batch is durable.
pub trait FingerprintStore {
    fn enqueue_store(&mut self, record: FingerprintRecord);
    fn flush_store(&mut self) -> Result<()>;

    fn enqueue_query(&mut self, hash: u64);
    fn flush_query(
        &mut self,
        range: u64,
        avoid: &HashSet<u32>,
    ) -> Result<HashMap<u64, Vec<FingerprintRecord>>>;

    fn enqueue_delete(&mut self, record: FingerprintRecord);
    fn flush_delete(&mut self) -> Result<()>;

    fn store_metadata(&mut self, meta: &ResourceMetadata) -> Result<()>;
    fn get_metadata(&mut self, resource_id: u32) -> Result<Option<ResourceMetadata>>;
    fn delete_metadata(&mut self, resource_id: u32) -> Result<()>;

    fn stats(&mut self) -> Result<IndexStats>;
}
