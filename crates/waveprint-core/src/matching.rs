//! Turns raw index hits into ranked, time-aligned match results.
//!
//! Raw hits are fuzzy hash collisions: plenty of them are chance. A true
//! match shows up as a large group of hits against one resource whose
//! reference-minus-query time offsets lie on a line. The aligner estimates
//! that line from the modal offset at both ends of the hit list, rejects
//! implausible time and frequency scale factors, re-filters every hit
//! against the fitted line and scores what remains.

use crate::config::WaveprintConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;


/// One raw index hit: a query fingerprint whose hash landed within the
/// fuzzy range of a stored fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub resource_id: u32,
    /// Anchor time of the stored fingerprint, in frames.
    pub match_time: u32,
    /// Anchor time of the query fingerprint, in frames.
    pub query_time: u32,
    pub match_f1: u16,
    pub query_f1: u16,
}

impl Hit {
    /// Reference time minus query time. Constant across a hit group when
    /// the match plays at identical speed; linearly drifting when stretched.
    fn delta_t(&self) -> i64 {
        self.match_time as i64 - self.query_time as i64
    }
}

/// A ranked match between a query and one indexed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_path: String,
    pub query_start: f64,
    pub query_stop: f64,
    pub ref_path: String,
    pub resource_id: u32,
    pub ref_start: f64,
    pub ref_stop: f64,
    /// Number of hits consistent with the fitted alignment.
    pub score: usize,
    /// Reference tempo relative to the query: 1.05 means the indexed audio
    /// plays 5% faster than the query.
    pub time_scale_factor: f64,
    /// Reference pitch relative to the query.
    pub frequency_scale_factor: f64,
    /// Fraction of one-second bins in the matched reference span containing
    /// at least one hit.
    pub seconds_with_match: f64,
}

impl QueryResult {
    /// The marker emitted when a query completes without any match. Not an
    /// error: the audio is simply not in the index.
    pub fn empty(query_path: &str, query_start: f64, query_stop: f64) -> Self {
        Self {
            query_path: query_path.to_string(),
            query_start,
            query_stop,
            ref_path: String::new(),
            resource_id: 0,
            ref_start: 0.0,
            ref_stop: 0.0,
            score: 0,
            time_scale_factor: 0.0,
            frequency_scale_factor: 0.0,
            seconds_with_match: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.score == 0
    }
}

/// Modal time offset of a hit slice. Ties resolve to the smallest offset so
/// the result never depends on map iteration order.
fn most_common_delta_t(hits: &[Hit]) -> i64 {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for hit in hits {
        *counts.entry(hit.delta_t()).or_insert(0) += 1;
    }
    let mut best = (0i64, 0usize);
    for (&delta, &count) in &counts {
        if count > best.1 || (count == best.1 && delta < best.0) {
            best = (delta, count);
        }
    }
    best.0
}

/// Statistical alignment of raw hits into ranked results.
pub struct MatchAligner<'a> {
    config: &'a WaveprintConfig,
}

impl<'a> MatchAligner<'a> {
    pub fn new(config: &'a WaveprintConfig) -> Self {
        Self { config }
    }

    /// Size of the early/late sub-lists used for anchor estimation.
    fn part_size(&self, hit_count: usize) -> usize {
        (hit_count / self.config.hit_part_divider)
            .max(self.config.min_unfiltered_hits)
            .min(self.config.hit_part_max_size)
    }

    /// Align raw hits and return results ranked by descending score,
    /// truncated to `max_results`. An empty vec means no match; the caller
    /// decides whether to emit [`QueryResult::empty`].
    ///
    /// `resolve_path` maps a resource id to its stored path, if known.
    pub fn align<F>(
        &self,
        query_path: &str,
        hits: &[Hit],
        max_results: usize,
        resolve_path: F,
    ) -> Vec<QueryResult>
    where
        F: Fn(u32) -> Option<String>,
    {
        let mut per_resource: HashMap<u32, Vec<Hit>> = HashMap::new();
        for &hit in hits {
            per_resource.entry(hit.resource_id).or_default().push(hit);
        }

        let mut results: Vec<QueryResult> = per_resource
            .into_iter()
            .filter(|(_, list)| list.len() >= self.config.min_unfiltered_hits)
            .filter_map(|(resource_id, mut list)| {
                list.sort_by_key(|hit| hit.query_time);
                self.align_resource(query_path, resource_id, &list, &resolve_path)
            })
            .collect();

        results.sort_by(|a, b| b.score.cmp(&a.score).then(a.resource_id.cmp(&b.resource_id)));
        results.truncate(max_results);
        results
    }

    fn align_resource<F>(
        &self,
        query_path: &str,
        resource_id: u32,
        hits: &[Hit],
        resolve_path: &F,
    ) -> Option<QueryResult>
    where
        F: Fn(u32) -> Option<String>,
    {
        let config = self.config;
        let part = self.part_size(hits.len()).min(hits.len());
        let first_hits = &hits[..part];
        let last_hits = &hits[hits.len() - part..];

        // One anchor per end: the modal offset and the first (respectively
        // last) hit carrying it.
        let y1 = most_common_delta_t(first_hits);
        let early = first_hits.iter().find(|hit| hit.delta_t() == y1)?;
        let y2 = most_common_delta_t(last_hits);
        let late = last_hits.iter().rev().find(|hit| hit.delta_t() == y2)?;

        let x1 = early.query_time as f64;
        let x2 = late.query_time as f64;
        // Degenerate span: both anchors at the same query time means there
        // is no stretch to estimate; treat the offset as constant.
        let slope = if x1 == x2 {
            0.0
        } else {
            (y2 as f64 - y1 as f64) / (x2 - x1)
        };
        let offset = -x1 * slope + y1 as f64;
        let time_factor = 1.0 / (1.0 - slope);
        let freq_factor =
            config.bin_to_hz(early.match_f1) / config.bin_to_hz(early.query_f1.max(1));

        if time_factor <= config.min_time_factor
            || time_factor >= config.max_time_factor
            || freq_factor <= config.min_freq_factor
            || freq_factor >= config.max_freq_factor
        {
            return None;
        }

        // Keep the hits the fitted line explains.
        let threshold = config.query_range as f64;
        let filtered: Vec<&Hit> = hits
            .iter()
            .filter(|hit| {
                let predicted = slope * hit.query_time as f64 + offset;
                (hit.delta_t() as f64 - predicted).abs() <= threshold
            })
            .collect();
        if filtered.len() <= config.min_filtered_hits {
            return None;
        }

        let query_start = config.frame_to_seconds(filtered[0].query_time);
        let query_stop = config.frame_to_seconds(filtered[filtered.len() - 1].query_time);
        if query_stop - query_start < config.min_match_duration {
            return None;
        }

        let ref_start = config.frame_to_seconds(filtered[0].match_time);
        let ref_stop = config.frame_to_seconds(filtered[filtered.len() - 1].match_time);

        // Per-second histogram of the matched reference span. A real match
        // covers the span evenly; a lucky hash cluster leaves most seconds
        // empty.
        let mut seconds_hit: HashMap<i64, usize> = HashMap::new();
        for hit in &filtered {
            let second = (config.frame_to_seconds(hit.match_time) - ref_start) as i64;
            *seconds_hit.entry(second).or_insert(0) += 1;
        }
        let span_seconds = (ref_stop - ref_start).ceil().max(1.0);
        let coverage = seconds_hit.len() as f64 / span_seconds;
        if coverage < config.min_seconds_with_match {
            return None;
        }

        Some(QueryResult {
            query_path: query_path.to_string(),
            query_start,
            query_stop,
            ref_path: resolve_path(resource_id).unwrap_or_default(),
            resource_id,
            ref_start,
            ref_stop,
            score: filtered.len(),
            time_scale_factor: time_factor,
            frequency_scale_factor: freq_factor,
            seconds_with_match: coverage,
        })
    }
}
