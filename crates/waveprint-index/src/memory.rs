//! In-memory index over a `BTreeMap`, for tests and ephemeral runs.
//!
//! The shared map lives behind an `Arc<RwLock<..>>`; handles are cheap
//! clones that each own private batch queues, mirroring the one-handle-per-
//! worker discipline of the persisted store. `flush_query` holds a single
//! read guard for all probes, which is the snapshot guarantee in miniature.

use crate::error::Result;
use crate::record::{FingerprintRecord, ResourceMetadata};
use crate::store::{FingerprintStore, IndexStats};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Shared {
    prints: BTreeMap<u64, Vec<FingerprintRecord>>,
    metadata: HashMap<u32, ResourceMetadata>,
}

#[derive(Default)]
pub struct MemoryStore {
    shared: Arc<RwLock<Shared>>,
    store_queue: Vec<FingerprintRecord>,
    query_queue: Vec<u64>,
    delete_queue: Vec<FingerprintRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new handle over the same shared map, with empty queues of its own.
    pub fn handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            store_queue: Vec::new(),
            query_queue: Vec::new(),
            delete_queue: Vec::new(),
        }
    }
}

impl FingerprintStore for MemoryStore {
    fn enqueue_store(&mut self, record: FingerprintRecord) {
        self.store_queue.push(record);
    }

    fn flush_store(&mut self) -> Result<()> {
        if self.store_queue.is_empty() {
            return Ok(());
        }
        let mut shared = self.shared.write().unwrap();
        for record in self.store_queue.drain(..) {
            shared.prints.entry(record.hash).or_default().push(record);
        }
        Ok(())
    }

    fn enqueue_query(&mut self, hash: u64) {
        self.query_queue.push(hash);
    }

    fn flush_query(
        &mut self,
        range: u64,
        avoid: &HashSet<u32>,
    ) -> Result<HashMap<u64, Vec<FingerprintRecord>>> {
        let mut hits: HashMap<u64, Vec<FingerprintRecord>> = HashMap::new();
        if self.query_queue.is_empty() {
            return Ok(hits);
        }
        let shared = self.shared.read().unwrap();
        for probe in self.query_queue.drain(..) {
            let low = probe.saturating_sub(range);
            let high = probe + range;
            for (_, records) in shared.prints.range(low..=high) {
                for record in records {
                    if avoid.contains(&record.resource_id) {
                        continue;
                    }
                    hits.entry(probe).or_default().push(*record);
                }
            }
        }
        Ok(hits)
    }

    fn enqueue_delete(&mut self, record: FingerprintRecord) {
        self.delete_queue.push(record);
    }

    fn flush_delete(&mut self) -> Result<()> {
        if self.delete_queue.is_empty() {
            return Ok(());
        }
        let mut shared = self.shared.write().unwrap();
        for record in self.delete_queue.drain(..) {
            let emptied = match shared.prints.get_mut(&record.hash) {
                Some(records) => {
                    records.retain(|r| r != &record);
                    records.is_empty()
                }
                None => false,
            };
            if emptied {
                shared.prints.remove(&record.hash);
            }
        }
        Ok(())
    }

    fn store_metadata(&mut self, meta: &ResourceMetadata) -> Result<()> {
        self.shared
            .write()
            .unwrap()
            .metadata
            .insert(meta.resource_id, meta.clone());
        Ok(())
    }

    fn get_metadata(&mut self, resource_id: u32) -> Result<Option<ResourceMetadata>> {
        Ok(self.shared.read().unwrap().metadata.get(&resource_id).cloned())
    }

    fn delete_metadata(&mut self, resource_id: u32) -> Result<()> {
        self.shared.write().unwrap().metadata.remove(&resource_id);
        Ok(())
    }

    fn stats(&mut self) -> Result<IndexStats> {
        let shared = self.shared.read().unwrap();
        Ok(IndexStats {
            print_count: shared.prints.values().map(|v| v.len() as u64).sum(),
            resource_count: shared.metadata.len() as u64,
            total_duration_seconds: shared
                .metadata
                .values()
                .map(|m| m.duration_seconds as f64)
                .sum::<f64>() as u64,
        })
    }
}
