//! End-to-end tests of the engine over the in-memory store: index audio,
//! query it back, delete it, and check the alignment arithmetic on
//! synthetic prints.

use std::collections::HashSet;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use waveprint_cli::engine::Engine;
use waveprint_core::audio::SampleFrameSource;
use waveprint_core::config::WaveprintConfig;
use waveprint_core::extract_fingerprints;
use waveprint_core::fingerprint::PrintRef;
use waveprint_index::{resource_id, FingerprintRecord, MemoryStore, ResourceMetadata};

/// Tone bursts every quarter second over a broadband noise floor, hopping
/// through a frequency pattern. `seed` picks both the pattern and the noise,
/// so different seeds sound like different songs.
fn tone_pattern(seconds: f64, sample_rate: u32, seed: u32) -> Vec<f32> {
    let total = (seconds * sample_rate as f64) as usize;
    let mut noise_state = seed.wrapping_mul(0x9e37_79b9).wrapping_add(1);
    (0..total)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let burst = (t / 0.25) as u32;
            let step = (burst.wrapping_mul(seed * 2 + 7)) % 17;
            let freq = 350.0 + step as f32 * 145.0;
            let envelope = ((t % 0.25) * 4.0 * PI).sin().abs();
            noise_state = noise_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = (noise_state >> 16) as f32 / 32768.0 - 1.0;
            0.6 * envelope * (2.0 * PI * freq * t).sin() + 0.3 * noise
        })
        .collect()
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer
            .write_sample((sample * i16::MAX as f32 * 0.5) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

fn wav_file(dir: &Path, name: &str, samples: &[f32]) -> PathBuf {
    let path = dir.join(name);
    write_wav(&path, samples, 16000);
    path
}

/// Default matching parameters, but relaxed extraction gates: the contrast
/// thresholds are calibrated for dense produced music and reject sparse
/// synthetic tone spectra almost entirely.
fn test_config() -> WaveprintConfig {
    WaveprintConfig {
        min_ratio_threshold: 0.005,
        max_ratio_threshold: 0.995,
        min_energy_for_point: 0.05,
        ..WaveprintConfig::default()
    }
}

fn engine_over(store: &MemoryStore) -> Engine<MemoryStore> {
    Engine::new(test_config(), store.handle())
}

#[test]
fn test_store_and_self_query_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let song = wav_file(dir.path(), "song.wav", &tone_pattern(30.0, 16000, 1));

    let meta = engine_over(&store).store_resource(&song, None).unwrap();
    assert!(meta.print_count > 0);
    assert!((meta.duration_seconds - 30.0).abs() < 0.1);

    let results = engine_over(&store).query_file(&song, 10, false).unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.resource_id, meta.resource_id);
    assert_eq!(result.ref_path, song.to_string_lossy());
    assert!((result.time_scale_factor - 1.0).abs() < 0.05);
    assert!((result.frequency_scale_factor - 1.0).abs() < 0.05);
    assert!((result.ref_start - result.query_start).abs() < 0.3);
}

#[test]
fn test_shifted_query_reports_the_offset() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let pattern = tone_pattern(25.0, 16000, 1);
    let song = wav_file(dir.path(), "song.wav", &pattern);

    engine_over(&store).store_resource(&song, None).unwrap();

    // The same audio preceded by 10 seconds of silence: matched material
    // starts 10 seconds later in the query than in the reference.
    let mut shifted = vec![0.0f32; 16000 * 10];
    shifted.extend_from_slice(&pattern);
    let query = wav_file(dir.path(), "shifted.wav", &shifted);

    let results = engine_over(&store).query_file(&query, 10, false).unwrap();
    assert_eq!(results.len(), 1);
    let delta = results[0].query_start - results[0].ref_start;
    assert!((delta - 10.0).abs() < 0.3, "offset was {delta}");
}

#[test]
fn test_unknown_audio_yields_no_match() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let known = wav_file(dir.path(), "known.wav", &tone_pattern(20.0, 16000, 1));
    let unknown = wav_file(dir.path(), "unknown.wav", &tone_pattern(20.0, 16000, 9));

    engine_over(&store).store_resource(&known, None).unwrap();

    let results = engine_over(&store).query_file(&unknown, 10, false).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_avoid_self_suppresses_own_match() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let song = wav_file(dir.path(), "song.wav", &tone_pattern(20.0, 16000, 2));

    engine_over(&store).store_resource(&song, None).unwrap();

    let results = engine_over(&store).query_file(&song, 10, true).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let song = wav_file(dir.path(), "song.wav", &tone_pattern(20.0, 16000, 3));

    let mut engine = engine_over(&store);
    engine.store_resource(&song, None).unwrap();
    assert!(engine.has_resource(&song).unwrap());

    let deleted = engine.delete_resource(&song, None).unwrap();
    assert!(deleted > 0);
    assert!(!engine.has_resource(&song).unwrap());

    let results = engine_over(&store).query_file(&song, 10, false).unwrap();
    assert!(results.is_empty());
    assert_eq!(engine.stats().unwrap().print_count, 0);
}

#[test]
fn test_reindexing_is_idempotent_per_file() {
    // The resource id derives from the file name alone, so a moved copy
    // resolves to the same resource.
    let dir = tempfile::tempdir().unwrap();
    let subdir = dir.path().join("moved");
    std::fs::create_dir(&subdir).unwrap();
    let pattern = tone_pattern(12.0, 16000, 4);
    let a = wav_file(dir.path(), "track.wav", &pattern);
    let b = wav_file(&subdir, "track.wav", &pattern);

    assert_eq!(
        resource_id(&a.to_string_lossy()),
        resource_id(&b.to_string_lossy())
    );

    let store = MemoryStore::new();
    let mut engine = engine_over(&store);
    engine.store_resource(&a, None).unwrap();
    assert!(engine.has_resource(&b).unwrap());
}

#[test]
fn test_extraction_is_shift_invariant() {
    // Prepending hop-aligned silence shifts event point times but leaves
    // the relative-feature hashes untouched.
    let config = test_config();
    let pattern = tone_pattern(15.0, 16000, 1);

    let extract = |samples: Vec<f32>| {
        let mut source =
            SampleFrameSource::new(samples, 16000, config.frame_size, config.hop_size());
        extract_fingerprints(&mut source, &config).unwrap()
    };

    let original = extract(pattern.clone());
    let mut shifted_samples = vec![0.0f32; config.hop_size() * 2000];
    shifted_samples.extend_from_slice(&pattern);
    let shifted = extract(shifted_samples);

    let original_hashes: HashSet<u64> = original.iter().map(|fp| fp.hash()).collect();
    let shifted_hashes: HashSet<u64> = shifted.iter().map(|fp| fp.hash()).collect();
    let common = original_hashes.intersection(&shifted_hashes).count();
    assert!(!original_hashes.is_empty());
    assert!(
        common * 2 >= original_hashes.len(),
        "only {common} of {} hashes survived the shift",
        original_hashes.len()
    );
}

/// Synthetic prints on a regular grid: hashes spaced far enough apart that
/// the fuzzy range never conflates two of them.
fn synthetic_records(resource: u32, count: u32) -> Vec<FingerprintRecord> {
    (0..count)
        .map(|i| FingerprintRecord {
            hash: 10_000 + 10 * i as u64,
            resource_id: resource,
            t: 12 * i,
            f: 100,
        })
        .collect()
}

fn synthetic_metadata(resource: u32, records: &[FingerprintRecord]) -> ResourceMetadata {
    ResourceMetadata {
        resource_id: resource,
        duration_seconds: 60.0,
        print_count: records.len() as u32,
        path: format!("synthetic-{resource}.wav"),
    }
}

#[test]
fn test_synthetic_offset_scenario() {
    // 600 stored prints spanning a minute; the query replays prints 105..230
    // shifted 1250 frames (10 seconds) earlier. Expect exactly one match
    // with the full sub-span as its score and a 10 second offset.
    let store = MemoryStore::new();
    let mut engine = engine_over(&store);
    let records = synthetic_records(77, 600);
    engine
        .store_prints(&records, &synthetic_metadata(77, &records))
        .unwrap();

    let query: Vec<PrintRef> = records[105..230]
        .iter()
        .map(|r| PrintRef {
            hash: r.hash,
            t1: r.t - 1250,
            f1: r.f as u16,
        })
        .collect();

    let results = engine
        .query_prints("scenario", &query, 10, &HashSet::new())
        .unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.score, 125);
    assert_eq!(result.ref_path, "synthetic-77.wav");
    assert!((result.time_scale_factor - 1.0).abs() < 0.05);
    assert!((result.ref_start - result.query_start - 10.0).abs() < 0.1);
}

#[test]
fn test_synthetic_stretch_reports_time_factor() {
    // Stored prints play 5% faster than the query ones.
    let store = MemoryStore::new();
    let mut engine = engine_over(&store);
    let records: Vec<FingerprintRecord> = (0..600u32)
        .map(|i| FingerprintRecord {
            hash: 10_000 + 10 * i as u64,
            resource_id: 5,
            t: (12.0 * i as f64 / 1.05) as u32,
            f: 100,
        })
        .collect();
    engine
        .store_prints(&records, &synthetic_metadata(5, &records))
        .unwrap();

    let query: Vec<PrintRef> = (0..600u32)
        .map(|i| PrintRef {
            hash: 10_000 + 10 * i as u64,
            t1: 12 * i,
            f1: 100,
        })
        .collect();

    let results = engine
        .query_prints("stretch", &query, 10, &HashSet::new())
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!((results[0].time_scale_factor - 1.0 / 1.05).abs() < 0.02);
}

#[test]
fn test_hit_count_threshold_boundary() {
    // Nine overlapping prints is one short of min_unfiltered_hits.
    let store = MemoryStore::new();
    let mut engine = engine_over(&store);
    let records = synthetic_records(8, 600);
    engine
        .store_prints(&records, &synthetic_metadata(8, &records))
        .unwrap();

    let query: Vec<PrintRef> = records[..9]
        .iter()
        .map(|r| PrintRef {
            hash: r.hash,
            t1: r.t,
            f1: r.f as u16,
        })
        .collect();

    let results = engine
        .query_prints("boundary", &query, 10, &HashSet::new())
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_monitor_finds_matches_in_every_segment() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let song = wav_file(dir.path(), "long.wav", &tone_pattern(60.0, 16000, 6));

    engine_over(&store).store_resource(&song, None).unwrap();

    let mut segments = 0;
    let mut matched = 0;
    engine_over(&store)
        .monitor(&song, 3, false, &mut |_, results| {
            segments += 1;
            if results.iter().any(|r| !r.is_empty()) {
                matched += 1;
            }
        })
        .unwrap();

    // 60 seconds in 25 second steps advancing 20 seconds: three segments.
    assert_eq!(segments, 3);
    assert_eq!(matched, 3);
}

#[test]
fn test_store_resource_with_cache_replays_prints() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let cache = waveprint_index::FileCache::new(&cache_dir).unwrap();
    let song = wav_file(dir.path(), "song.wav", &tone_pattern(15.0, 16000, 2));

    let first_store = MemoryStore::new();
    let meta = engine_over(&first_store)
        .store_resource(&song, Some(&cache))
        .unwrap();
    assert!(cache.has_prints(meta.resource_id));

    // A second index built purely from the cache matches the first.
    let second_store = MemoryStore::new();
    let replayed = engine_over(&second_store)
        .store_resource(&song, Some(&cache))
        .unwrap();
    assert_eq!(replayed.print_count, meta.print_count);

    let results = engine_over(&second_store)
        .query_file(&song, 10, false)
        .unwrap();
    assert_eq!(results.len(), 1);
}
