//! Flat-file fingerprint cache.
//!
//! Extraction dominates indexing time, so extracted prints can be written
//! to plain text files and replayed into the index later without touching
//! the audio again. One `<resource_id>.tdb` file per resource with lines
//! `"<hash> <resource_id> <t> <f>"`, plus a `<resource_id>_meta_data.txt`
//! holding duration, print count and path, one per line. The format is
//! deliberately trivial: greppable, diffable, mergeable with cat.

use crate::error::{Result, StoreError};
use crate::record::{FingerprintRecord, ResourceMetadata};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Use `dir` as the cache directory, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn print_file(&self, resource_id: u32) -> PathBuf {
        self.dir.join(format!("{resource_id}.tdb"))
    }

    fn metadata_file(&self, resource_id: u32) -> PathBuf {
        self.dir.join(format!("{resource_id}_meta_data.txt"))
    }

    pub fn has_prints(&self, resource_id: u32) -> bool {
        self.print_file(resource_id).exists()
    }

    pub fn write_prints(&self, resource_id: u32, records: &[FingerprintRecord]) -> Result<()> {
        let mut text = String::with_capacity(records.len() * 24);
        for record in records {
            let _ = writeln!(
                text,
                "{} {} {} {}",
                record.hash, record.resource_id, record.t, record.f
            );
        }
        std::fs::write(self.print_file(resource_id), text)?;
        Ok(())
    }

    pub fn write_metadata(&self, meta: &ResourceMetadata) -> Result<()> {
        let text = format!(
            "{}\n{}\n{}\n",
            meta.duration_seconds, meta.print_count, meta.path
        );
        std::fs::write(self.metadata_file(meta.resource_id), text)?;
        Ok(())
    }

    /// Read back cached prints, or `None` when the resource is not cached.
    pub fn read_prints(&self, resource_id: u32) -> Result<Option<Vec<FingerprintRecord>>> {
        let path = self.print_file(resource_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let mut next = |name: &str| -> Result<u64> {
                fields
                    .next()
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!(
                            "{}:{}: missing {name}",
                            path.display(),
                            line_number + 1
                        ))
                    })?
                    .parse()
                    .map_err(|e| {
                        StoreError::Corrupt(format!(
                            "{}:{}: bad {name}: {e}",
                            path.display(),
                            line_number + 1
                        ))
                    })
            };
            records.push(FingerprintRecord {
                hash: next("hash")?,
                resource_id: next("resource id")? as u32,
                t: next("time")? as u32,
                f: next("frequency bin")? as u32,
            });
        }
        Ok(Some(records))
    }

    pub fn read_metadata(&self, resource_id: u32) -> Result<Option<ResourceMetadata>> {
        let path = self.metadata_file(resource_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let mut lines = text.lines();
        let corrupt = |what: &str| StoreError::Corrupt(format!("{}: {what}", path.display()));

        let duration_seconds: f32 = lines
            .next()
            .ok_or_else(|| corrupt("missing duration"))?
            .parse()
            .map_err(|_| corrupt("bad duration"))?;
        let print_count: u32 = lines
            .next()
            .ok_or_else(|| corrupt("missing print count"))?
            .parse()
            .map_err(|_| corrupt("bad print count"))?;
        let path_line = lines.next().ok_or_else(|| corrupt("missing path"))?;

        Ok(Some(ResourceMetadata {
            resource_id,
            duration_seconds,
            print_count,
            path: path_line.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prints_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        let records = vec![
            FingerprintRecord { hash: 12345, resource_id: 7, t: 10, f: 100 },
            FingerprintRecord { hash: 67890, resource_id: 7, t: 55, f: 230 },
        ];

        assert!(!cache.has_prints(7));
        cache.write_prints(7, &records).unwrap();
        assert!(cache.has_prints(7));
        assert_eq!(cache.read_prints(7).unwrap().unwrap(), records);
    }

    #[test]
    fn test_missing_resource_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        assert!(cache.read_prints(99).unwrap().is_none());
        assert!(cache.read_metadata(99).unwrap().is_none());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        let meta = ResourceMetadata {
            resource_id: 3,
            duration_seconds: 42.5,
            print_count: 800,
            path: "music/song.wav".to_string(),
        };
        cache.write_metadata(&meta).unwrap();
        assert_eq!(cache.read_metadata(3).unwrap(), Some(meta));
    }

    #[test]
    fn test_garbage_lines_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        std::fs::write(cache.print_file(5), "12 34 not-a-number 7\n").unwrap();

        let err = cache.read_prints(5).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
