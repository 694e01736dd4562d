//! Fingerprints: triples of event points hashed on relative features only.
//!
//! The hash encodes orderings, gaps and ratios between the three points,
//! never an absolute time, so identical audio at a different position in a
//! file produces identical hashes. Near-identical audio lands on nearby hash
//! values, which is what makes fuzzy range queries on the index work.

use crate::config::WaveprintConfig;
use crate::eventpoint::EventPoint;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};

/// The named components of a fingerprint hash, one field per packed value.
///
/// Packed layout, least significant bit first:
///
/// | bits  | field              | content                                 |
/// |-------|--------------------|-----------------------------------------|
/// | 0-5   | `time_ratio`       | `(t2-t1)/(t3-t1)` quantized to 6 bits   |
/// | 6     | `f1_gt_f2`         | frequency ordering flag                 |
/// | 7     | `f2_gt_f3`         | frequency ordering flag                 |
/// | 8     | `f3_gt_f1`         | frequency ordering flag                 |
/// | 9     | `m1_gt_m2`         | magnitude ordering flag                 |
/// | 10    | `m2_gt_m3`         | magnitude ordering flag                 |
/// | 11    | `m3_gt_m1`         | magnitude ordering flag                 |
/// | 12    | `first_gap_longer` | `(t2-t1) > (t3-t2)`                     |
/// | 13    | `low_gap_wider`    | `|f2-f1| > |f3-f2|`                     |
/// | 14-21 | `f1_band`          | `f1 >> 5`, coarse anchor frequency band |
/// | 22-27 | `df21_coarse`      | `|f2-f1| >> 2`                          |
/// | 28-33 | `df32_coarse`      | `|f3-f2| >> 2`                          |
///
/// The quantized time ratio sits in the least significant bits on purpose:
/// a range query of `hash ± r` tolerates exactly the time-quantization
/// jitter of slightly stretched or compressed audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashFields {
    pub time_ratio: u8,
    pub f1_gt_f2: bool,
    pub f2_gt_f3: bool,
    pub f3_gt_f1: bool,
    pub m1_gt_m2: bool,
    pub m2_gt_m3: bool,
    pub m3_gt_m1: bool,
    pub first_gap_longer: bool,
    pub low_gap_wider: bool,
    pub f1_band: u8,
    pub df21_coarse: u8,
    pub df32_coarse: u8,
}

impl HashFields {
    /// Derive the fields from an ordered point triple (`t1 < t2 < t3`).
    pub fn from_points(p1: EventPoint, p2: EventPoint, p3: EventPoint) -> Self {
        let df21 = p2.f.abs_diff(p1.f);
        let df32 = p3.f.abs_diff(p2.f);
        let ratio = (p2.t - p1.t) as f32 / (p3.t - p1.t) as f32;

        Self {
            time_ratio: ((ratio * 64.0) as u8).min(63),
            f1_gt_f2: p1.f > p2.f,
            f2_gt_f3: p2.f > p3.f,
            f3_gt_f1: p3.f > p1.f,
            m1_gt_m2: p1.magnitude > p2.magnitude,
            m2_gt_m3: p2.magnitude > p3.magnitude,
            m3_gt_m1: p3.magnitude > p1.magnitude,
            first_gap_longer: (p2.t - p1.t) > (p3.t - p2.t),
            low_gap_wider: df21 > df32,
            f1_band: (p1.f >> 5) as u8,
            df21_coarse: ((df21 >> 2) & 0x3f) as u8,
            df32_coarse: ((df32 >> 2) & 0x3f) as u8,
        }
    }

    /// Pack the fields into a 64-bit hash (34 bits used).
    pub fn pack(&self) -> u64 {
        (self.time_ratio as u64 & 0x3f)
            | (self.f1_gt_f2 as u64) << 6
            | (self.f2_gt_f3 as u64) << 7
            | (self.f3_gt_f1 as u64) << 8
            | (self.m1_gt_m2 as u64) << 9
            | (self.m2_gt_m3 as u64) << 10
            | (self.m3_gt_m1 as u64) << 11
            | (self.first_gap_longer as u64) << 12
            | (self.low_gap_wider as u64) << 13
            | (self.f1_band as u64) << 14
            | (self.df21_coarse as u64 & 0x3f) << 22
            | (self.df32_coarse as u64 & 0x3f) << 28
    }

    /// Recover the fields from a packed hash. `pack` and `unpack` are exact
    /// inverses.
    pub fn unpack(hash: u64) -> Self {
        Self {
            time_ratio: (hash & 0x3f) as u8,
            f1_gt_f2: hash >> 6 & 1 == 1,
            f2_gt_f3: hash >> 7 & 1 == 1,
            f3_gt_f1: hash >> 8 & 1 == 1,
            m1_gt_m2: hash >> 9 & 1 == 1,
            m2_gt_m3: hash >> 10 & 1 == 1,
            m3_gt_m1: hash >> 11 & 1 == 1,
            first_gap_longer: hash >> 12 & 1 == 1,
            low_gap_wider: hash >> 13 & 1 == 1,
            f1_band: (hash >> 14 & 0xff) as u8,
            df21_coarse: (hash >> 22 & 0x3f) as u8,
            df32_coarse: (hash >> 28 & 0x3f) as u8,
        }
    }
}

/// Three event points in strict time order plus their memoized hash.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub p1: EventPoint,
    pub p2: EventPoint,
    pub p3: EventPoint,
    hash: OnceCell<u64>,
}

impl Fingerprint {
    pub fn new(p1: EventPoint, p2: EventPoint, p3: EventPoint) -> Self {
        debug_assert!(p1.t < p2.t && p2.t < p3.t);
        Self {
            p1,
            p2,
            p3,
            hash: OnceCell::new(),
        }
    }

    /// The packed 64-bit hash. Computed once per fingerprint.
    pub fn hash(&self) -> u64 {
        *self
            .hash
            .get_or_init(|| HashFields::from_points(self.p1, self.p2, self.p3).pack())
    }

    /// Time of the anchor point, in analysis frames.
    pub fn t1(&self) -> u32 {
        self.p1.t
    }

    /// Frequency bin of the anchor point.
    pub fn f1(&self) -> u16 {
        self.p1.f
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash() && self.p1.t == other.p1.t
    }
}

/// A compact query-side view of a fingerprint used after index lookup,
/// when only the hash and anchor position are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintRef {
    pub hash: u64,
    pub t1: u32,
    pub f1: u16,
}

impl From<&Fingerprint> for PrintRef {
    fn from(fp: &Fingerprint) -> Self {
        Self {
            hash: fp.hash(),
            t1: fp.t1(),
            f1: fp.f1(),
        }
    }
}

/// Combines nearby event point triples into fingerprints.
pub struct FingerprintBuilder {
    min_freq_dist: u16,
    max_freq_dist: u16,
    min_time_dist: u32,
    max_time_dist: u32,
    max_per_anchor: usize,
}

impl FingerprintBuilder {
    pub fn new(config: &WaveprintConfig) -> Self {
        Self {
            min_freq_dist: config.fp_min_freq_dist,
            max_freq_dist: config.fp_max_freq_dist,
            min_time_dist: config.fp_min_time_dist,
            max_time_dist: config.fp_max_time_dist,
            max_per_anchor: config.max_prints_per_anchor,
        }
    }

    fn pair_in_range(&self, a: EventPoint, b: EventPoint) -> bool {
        let dt = b.t.saturating_sub(a.t);
        let df = b.f.abs_diff(a.f);
        dt >= self.min_time_dist
            && dt <= self.max_time_dist
            && df >= self.min_freq_dist
            && df <= self.max_freq_dist
    }

    /// Build fingerprints from time-ordered event points.
    ///
    /// Every point acts as an anchor; second and third points are drawn from
    /// the bounded time/frequency neighbourhood after it. Per anchor, only
    /// the `max_prints_per_anchor` triples with the highest combined
    /// magnitude are kept, so busy spectra cannot explode the print count.
    /// Fewer than three points in range yields nothing.
    pub fn build(&self, points: &[EventPoint]) -> Vec<Fingerprint> {
        let mut prints = Vec::new();
        let mut per_anchor: Vec<(f32, Fingerprint)> = Vec::new();

        for (i, &p1) in points.iter().enumerate() {
            per_anchor.clear();
            for (j, &p2) in points.iter().enumerate().skip(i + 1) {
                if p2.t.saturating_sub(p1.t) > self.max_time_dist {
                    break;
                }
                if !self.pair_in_range(p1, p2) {
                    continue;
                }
                for &p3 in &points[j + 1..] {
                    if p3.t.saturating_sub(p2.t) > self.max_time_dist {
                        break;
                    }
                    if !self.pair_in_range(p2, p3) {
                        continue;
                    }
                    let weight = p1.magnitude + p2.magnitude + p3.magnitude;
                    per_anchor.push((weight, Fingerprint::new(p1, p2, p3)));
                }
            }

            if per_anchor.len() > self.max_per_anchor {
                per_anchor
                    .sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                per_anchor.truncate(self.max_per_anchor);
            }
            prints.extend(per_anchor.drain(..).map(|(_, fp)| fp));
        }
        prints
    }
}
