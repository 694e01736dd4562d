//! SQLite-backed index.
//!
//! The ordered-multimap capability comes from a plain two-column table with
//! a B-tree index on the hash: duplicate hashes are just duplicate rows, and
//! the fuzzy probe is a `BETWEEN` range scan. The database runs in WAL mode,
//! so readers see a consistent snapshot while a writer commits. Values are
//! the fixed-layout records from [`crate::record`]; the schema knows nothing
//! about their contents.
//!
//! One `SqliteStore` per worker: each holds its own connection and its own
//! batch queues.

use crate::error::{Result, StoreError};
use crate::record::{
    decode_metadata_value, decode_print_value, encode_metadata_value, encode_print_value,
    FingerprintRecord, ResourceMetadata,
};
use crate::store::{FingerprintStore, IndexStats};
use log::debug;
use rusqlite::{Connection, ErrorCode};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS prints (
    hash  INTEGER NOT NULL,
    value BLOB    NOT NULL
);
CREATE INDEX IF NOT EXISTS prints_by_hash ON prints(hash);
CREATE TABLE IF NOT EXISTS resources (
    id    INTEGER PRIMARY KEY,
    value BLOB    NOT NULL
);
";

fn db_err(path: &Path, e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreError::Locked {
            path: path.to_path_buf(),
        },
        _ => StoreError::Backend(e),
    }
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    store_queue: Vec<FingerprintRecord>,
    query_queue: Vec<u64>,
    delete_queue: Vec<FingerprintRecord>,
}

impl SqliteStore {
    /// Open (and if needed create) the index database at `path`. Every
    /// worker opens its own store against the same path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| db_err(path, e))?;
        conn.busy_timeout(std::time::Duration::from_millis(1000))
            .map_err(|e| db_err(path, e))?;
        // WAL keeps readers on a snapshot while a writer commits.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err(path, e))?;
        conn.execute_batch(SCHEMA).map_err(|e| db_err(path, e))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            store_queue: Vec::new(),
            query_queue: Vec::new(),
            delete_queue: Vec::new(),
        })
    }
}

impl FingerprintStore for SqliteStore {
    fn enqueue_store(&mut self, record: FingerprintRecord) {
        self.store_queue.push(record);
    }

    fn flush_store(&mut self) -> Result<()> {
        if self.store_queue.is_empty() {
            return Ok(());
        }
        let queue = std::mem::take(&mut self.store_queue);
        let path = self.path.clone();
        let tx = self.conn.transaction().map_err(|e| db_err(&path, e))?;
        {
            let mut insert = tx
                .prepare_cached("INSERT INTO prints(hash, value) VALUES (?1, ?2)")
                .map_err(|e| db_err(&path, e))?;
            for record in &queue {
                insert
                    .execute((record.hash as i64, encode_print_value(record).as_slice()))
                    .map_err(|e| db_err(&path, e))?;
            }
        }
        tx.commit().map_err(|e| db_err(&path, e))?;
        debug!("stored batch of {} prints", queue.len());
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
        let queue = std::mem::take(&mut self.query_queue);
        let path = self.path.clone();
        // A deferred transaction pins one snapshot across all probes.
        let tx = self.conn.transaction().map_err(|e| db_err(&path, e))?;
        {
            let mut select = tx
                .prepare_cached("SELECT hash, value FROM prints WHERE hash BETWEEN ?1 AND ?2")
                .map_err(|e| db_err(&path, e))?;
            for &probe in &queue {
                let low = probe.saturating_sub(range) as i64;
                let high = (probe + range) as i64;
                let mut rows = select
                    .query((low, high))
                    .map_err(|e| db_err(&path, e))?;
                while let Some(row) = rows.next().map_err(|e| db_err(&path, e))? {
                    let hash: i64 = row.get(0).map_err(|e| db_err(&path, e))?;
                    let value: Vec<u8> = row.get(1).map_err(|e| db_err(&path, e))?;
                    let record = decode_print_value(hash as u64, &value)?;
                    if avoid.contains(&record.resource_id) {
                        continue;
                    }
                    hits.entry(probe).or_default().push(record);
                }
            }
        }
        tx.commit().map_err(|e| db_err(&path, e))?;
        Ok(hits)
    }

    fn enqueue_delete(&mut self, record: FingerprintRecord) {
        self.delete_queue.push(record);
    }

    fn flush_delete(&mut self) -> Result<()> {
        if self.delete_queue.is_empty() {
            return Ok(());
        }
        let queue = std::mem::take(&mut self.delete_queue);
        let path = self.path.clone();
        let tx = self.conn.transaction().map_err(|e| db_err(&path, e))?;
        {
            let mut delete = tx
                .prepare_cached("DELETE FROM prints WHERE hash = ?1 AND value = ?2")
                .map_err(|e| db_err(&path, e))?;
            for record in &queue {
                delete
                    .execute((record.hash as i64, encode_print_value(record).as_slice()))
                    .map_err(|e| db_err(&path, e))?;
            }
        }
        tx.commit().map_err(|e| db_err(&path, e))?;
        debug!("deleted batch of {} prints", queue.len());
        Ok(())
    }

    fn store_metadata(&mut self, meta: &ResourceMetadata) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO resources(id, value) VALUES (?1, ?2)",
                (meta.resource_id as i64, encode_metadata_value(meta)),
            )
            .map_err(|e| db_err(&self.path, e))?;
        Ok(())
    }

    fn get_metadata(&mut self, resource_id: u32) -> Result<Option<ResourceMetadata>> {
        let value: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT value FROM resources WHERE id = ?1",
                [resource_id as i64],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(&self.path, other)),
            })?;
        value
            .map(|v| decode_metadata_value(resource_id, &v))
            .transpose()
    }

    fn delete_metadata(&mut self, resource_id: u32) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM resources WHERE id = ?1",
                [resource_id as i64],
            )
            .map_err(|e| db_err(&self.path, e))?;
        Ok(())
    }

    fn stats(&mut self) -> Result<IndexStats> {
        let path = self.path.clone();
        let print_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM prints", [], |row| row.get(0))
            .map_err(|e| db_err(&path, e))?;
        let resource_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))
            .map_err(|e| db_err(&path, e))?;

        let mut total_duration = 0f64;
        let mut select = self
            .conn
            .prepare("SELECT id, value FROM resources")
            .map_err(|e| db_err(&path, e))?;
        let mut rows = select.query([]).map_err(|e| db_err(&path, e))?;
        while let Some(row) = rows.next().map_err(|e| db_err(&path, e))? {
            let id: i64 = row.get(0).map_err(|e| db_err(&path, e))?;
            let value: Vec<u8> = row.get(1).map_err(|e| db_err(&path, e))?;
            total_duration += decode_metadata_value(id as u32, &value)?.duration_seconds as f64;
        }

        Ok(IndexStats {
            print_count: print_count as u64,
            resource_count: resource_count as u64,
            total_duration_seconds: total_duration as u64,
        })
    }
}
