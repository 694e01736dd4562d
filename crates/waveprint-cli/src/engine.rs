//! Orchestration: ties the extraction pipeline to a fingerprint store and
//! exposes the store / query / monitor / delete operations the binaries use.
//!
//! An engine owns one store handle and is used from one worker at a time;
//! parallelism happens by constructing one engine per worker over handles of
//! the same index.

use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use waveprint_core::audio::WavFrameSource;
use waveprint_core::config::WaveprintConfig;
use waveprint_core::extract_fingerprints;
use waveprint_core::fingerprint::PrintRef;
use waveprint_core::matching::{Hit, MatchAligner, QueryResult};
use waveprint_index::{
    resource_id, FileCache, FingerprintRecord, FingerprintStore, IndexStats, ResourceMetadata,
};

pub struct Engine<S: FingerprintStore> {
    config: WaveprintConfig,
    store: S,
}

impl<S: FingerprintStore> Engine<S> {
    pub fn new(config: WaveprintConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &WaveprintConfig {
        &self.config
    }

    /// Whether a resource with this file name is already indexed.
    pub fn has_resource(&mut self, path: &Path) -> Result<bool> {
        let id = resource_id(&path.to_string_lossy());
        Ok(self.store.get_metadata(id)?.is_some())
    }

    fn extract_records(
        &self,
        path: &Path,
        id: u32,
        offset_seconds: f64,
        duration_seconds: f64,
    ) -> Result<Vec<FingerprintRecord>> {
        let mut source = WavFrameSource::open_range(
            path,
            self.config.sample_rate,
            self.config.frame_size,
            self.config.hop_size(),
            offset_seconds,
            duration_seconds,
        )?;
        let prints = extract_fingerprints(&mut source, &self.config)?;
        Ok(prints
            .iter()
            .map(|fp| FingerprintRecord {
                hash: fp.hash(),
                resource_id: id,
                t: fp.t1(),
                f: fp.f1() as u32,
            })
            .collect())
    }

    /// Index one audio file. Returns the stored metadata.
    ///
    /// When a cache is given, cached prints are replayed instead of
    /// re-extracting, and freshly extracted prints are written to the cache.
    /// A file that yields zero prints is still registered with its duration,
    /// so re-runs do not retry it silently forever.
    pub fn store_resource(
        &mut self,
        path: &Path,
        cache: Option<&FileCache>,
    ) -> Result<ResourceMetadata> {
        let id = resource_id(&path.to_string_lossy());

        let cached = match cache {
            Some(cache) => cache.read_prints(id)?,
            None => None,
        };
        let (records, duration) = match cached {
            Some(records) => {
                let duration = cache
                    .and_then(|c| c.read_metadata(id).transpose())
                    .transpose()?
                    .map(|m| m.duration_seconds as f64)
                    .unwrap_or(0.0);
                info!("{}: replaying {} cached prints", path.display(), records.len());
                (records, duration)
            }
            None => {
                let records = self
                    .extract_records(path, id, 0.0, f64::MAX)
                    .with_context(|| format!("extracting {}", path.display()))?;
                let duration = WavFrameSource::duration_of(path)?;
                (records, duration)
            }
        };

        if records.is_empty() {
            warn!("{}: no fingerprints extracted", path.display());
        }

        for record in &records {
            self.store.enqueue_store(*record);
        }
        self.store.flush_store()?;

        let meta = ResourceMetadata {
            resource_id: id,
            duration_seconds: duration as f32,
            print_count: records.len() as u32,
            path: path.to_string_lossy().into_owned(),
        };
        self.store.store_metadata(&meta)?;

        if let Some(cache) = cache {
            cache.write_prints(id, &records)?;
            cache.write_metadata(&meta)?;
        }

        info!(
            "{}: stored {} prints over {:.1}s",
            path.display(),
            meta.print_count,
            meta.duration_seconds
        );
        Ok(meta)
    }

    /// Store pre-built records and metadata directly, bypassing extraction.
    pub fn store_prints(&mut self, records: &[FingerprintRecord], meta: &ResourceMetadata) -> Result<()> {
        for record in records {
            self.store.enqueue_store(*record);
        }
        self.store.flush_store()?;
        self.store.store_metadata(meta)?;
        Ok(())
    }

    /// Remove a resource: the same extraction as storing, turned into
    /// deletes. Returns the number of deleted prints.
    pub fn delete_resource(&mut self, path: &Path, cache: Option<&FileCache>) -> Result<usize> {
        let id = resource_id(&path.to_string_lossy());

        let cached = match cache {
            Some(cache) => cache.read_prints(id)?,
            None => None,
        };
        let records = match cached {
            Some(records) => records,
            None => self
                .extract_records(path, id, 0.0, f64::MAX)
                .with_context(|| format!("extracting {}", path.display()))?,
        };

        for record in &records {
            self.store.enqueue_delete(*record);
        }
        self.store.flush_delete()?;
        self.store.delete_metadata(id)?;

        info!("{}: deleted {} prints", path.display(), records.len());
        Ok(records.len())
    }

    /// Query already-extracted prints against the index.
    pub fn query_prints(
        &mut self,
        query_label: &str,
        prints: &[PrintRef],
        max_results: usize,
        avoid: &HashSet<u32>,
    ) -> Result<Vec<QueryResult>> {
        let mut print_by_hash: HashMap<u64, PrintRef> = HashMap::new();
        for print in prints {
            print_by_hash.insert(print.hash, *print);
            self.store.enqueue_query(print.hash);
        }
        let matches = self.store.flush_query(self.config.query_range, avoid)?;

        let mut hits = Vec::new();
        for (probe, records) in &matches {
            // flush_query only returns probes we enqueued
            let query_print = print_by_hash[probe];
            for record in records {
                hits.push(Hit {
                    resource_id: record.resource_id,
                    match_time: record.t,
                    query_time: query_print.t1,
                    match_f1: record.f as u16,
                    query_f1: query_print.f1,
                });
            }
        }
        info!(
            "{}: {} prints, {} raw hits",
            query_label,
            prints.len(),
            hits.len()
        );

        let mut paths: HashMap<u32, String> = HashMap::new();
        for hit in &hits {
            if !paths.contains_key(&hit.resource_id) {
                if let Some(meta) = self.store.get_metadata(hit.resource_id)? {
                    paths.insert(hit.resource_id, meta.path);
                }
            }
        }

        let aligner = MatchAligner::new(&self.config);
        Ok(aligner.align(query_label, &hits, max_results, |id| paths.get(&id).cloned()))
    }

    /// Query a slice of an audio file.
    pub fn query_segment(
        &mut self,
        path: &Path,
        max_results: usize,
        avoid: &HashSet<u32>,
        offset_seconds: f64,
        duration_seconds: f64,
    ) -> Result<Vec<QueryResult>> {
        let id = resource_id(&path.to_string_lossy());
        let label = if duration_seconds == f64::MAX {
            path.to_string_lossy().into_owned()
        } else {
            format!(
                "{}-{}_{}",
                path.display(),
                offset_seconds,
                offset_seconds + duration_seconds
            )
        };
        let records = self.extract_records(path, id, offset_seconds, duration_seconds)?;
        let prints: Vec<PrintRef> = records
            .iter()
            .map(|r| PrintRef {
                hash: r.hash,
                t1: r.t,
                f1: r.f as u16,
            })
            .collect();
        self.query_prints(&label, &prints, max_results, avoid)
    }

    /// Query a whole audio file. With `avoid_self`, hits on a resource with
    /// the query's own file name are suppressed, which keeps evaluation runs
    /// over indexed material honest.
    pub fn query_file(
        &mut self,
        path: &Path,
        max_results: usize,
        avoid_self: bool,
    ) -> Result<Vec<QueryResult>> {
        let mut avoid = HashSet::new();
        if avoid_self {
            avoid.insert(resource_id(&path.to_string_lossy()));
        }
        self.query_segment(path, max_results, &avoid, 0.0, f64::MAX)
    }

    /// Step through a long stream, querying overlapping segments. The
    /// handler receives the segment start and its ranked results, including
    /// the empty marker for segments with no match.
    pub fn monitor(
        &mut self,
        path: &Path,
        max_results: usize,
        avoid_self: bool,
        handler: &mut dyn FnMut(f64, &[QueryResult]),
    ) -> Result<()> {
        let mut avoid = HashSet::new();
        if avoid_self {
            avoid.insert(resource_id(&path.to_string_lossy()));
        }
        let total = WavFrameSource::duration_of(path)?;
        let step = self.config.monitor_step_seconds;
        let advance = (step - self.config.monitor_overlap_seconds).max(1.0);

        let mut start = 0.0;
        loop {
            let length = step.min(total - start);
            let results = self.query_segment(path, max_results, &avoid, start, length)?;
            if results.is_empty() {
                let empty = QueryResult::empty(&path.to_string_lossy(), start, start + length);
                handler(start, std::slice::from_ref(&empty));
            } else {
                handler(start, &results);
            }
            start += advance;
            if start + self.config.monitor_overlap_seconds >= total {
                break;
            }
        }
        Ok(())
    }

    pub fn stats(&mut self) -> Result<IndexStats> {
        Ok(self.store.stats()?)
    }

    /// Frame-count to seconds, for callers presenting raw print times.
    pub fn frame_to_seconds(&self, t: u32) -> f64 {
        self.config.frame_to_seconds(t)
    }
}
