//! Persisted fuzzy inverted index for fingerprint hashes, plus an
//! in-memory variant and a flat-file print cache.

pub mod error;
pub mod filecache;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use filecache::FileCache;
pub use memory::MemoryStore;
pub use record::{resource_id, FingerprintRecord, ResourceMetadata};
pub use sqlite::SqliteStore;
pub use store::{FingerprintStore, IndexStats};
