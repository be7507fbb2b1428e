use super::*;
use crate::fingerprint::{CANONICAL_SAMPLE_RATE, peaks_for, query_fingerprints};
use crate::index::memory::MemoryIndex;
use crate::testutil::{VOICES_A, VOICES_B, add_noise, melody, mix, sine};
use std::collections::BTreeSet;

const SR: u32 = CANONICAL_SAMPLE_RATE;

fn secs(samples: &[f32]) -> f64 {
    samples.len() as f64 / SR as f64
}

fn recognizer() -> Recognizer<MemoryIndex> {
    Recognizer::new(MemoryIndex::new())
}

fn save(rec: &Recognizer<MemoryIndex>, title: &str, samples: &[f32]) -> IndexedTrack {
    rec.register_and_index(
        &NewTrack::new(title, "Synth", &format!("ref:{title}")),
        samples,
        SR,
        secs(samples),
        DuplicatePolicy::Reject,
    )
    .unwrap()
}

#[test]
fn test_fingerprinting_is_deterministic() {
    let samples = melody(11, VOICES_A, 8.0, SR);
    let first = crate::fingerprint::fingerprint(&peaks_for(&samples, SR, 8.0).unwrap(), SR, 1);
    let second = crate::fingerprint::fingerprint(&peaks_for(&samples, SR, 8.0).unwrap(), SR, 1);
    assert!(!first.is_empty());
    assert_eq!(first, second);

    let rec = recognizer();
    save(&rec, "A", &samples);
    let a = rec.search(&samples, SR, 8.0).unwrap();
    rec.invalidate_cache();
    let b = rec.search(&samples, SR, 8.0).unwrap();
    assert!(!b.cached);
    assert_eq!(a.matches, b.matches);
}

#[test]
fn test_self_match_is_top_with_full_score() {
    let rec = recognizer();
    let track_a = melody(1, VOICES_A, 30.0, SR);
    let track_b = melody(2, VOICES_B, 30.0, SR);
    let a = save(&rec, "A", &track_a);
    save(&rec, "B", &track_b);

    let query = query_fingerprints(&peaks_for(&track_a, SR, 30.0).unwrap(), SR);
    let distinct: BTreeSet<u32> = query.iter().map(|fp| fp.address).collect();
    assert!(query.len() > distinct.len());

    let outcome = rec.search(&track_a, SR, 30.0).unwrap();
    let best = outcome.best().unwrap();
    assert_eq!(best.track_id, a.track_id);
    assert_eq!(best.title, "A");
    assert_eq!(best.external_ref, "ref:A");
    assert!(best.timestamp < 100);
    // Every stored address agrees on offset zero exactly once
    assert_eq!(best.score, a.fingerprints as f64);
    assert_eq!(distinct.len(), a.fingerprints);
    assert_eq!(best.confidence, 1.0);
    for other in &outcome.matches[1..] {
        assert!(!other.is_confident());
    }
}

#[test]
fn test_noisy_query_still_matches() {
    let rec = recognizer();
    let track_a = melody(3, VOICES_A, 20.0, SR);
    let a = save(&rec, "A", &track_a);
    save(&rec, "B", &melody(4, VOICES_B, 20.0, SR));

    let clean = rec.search(&track_a, SR, 20.0).unwrap();
    let noisy_samples = add_noise(&track_a, 0.02, 99);
    let noisy = rec.search(&noisy_samples, SR, 20.0).unwrap();

    let best = noisy.best().unwrap();
    assert_eq!(best.track_id, a.track_id);
    assert!(best.is_confident());
    assert!(best.score <= clean.best().unwrap().score);
    if let Some(runner_up) = noisy.matches.get(1) {
        assert!(best.score > 2.0 * runner_up.score);
    }
}

#[test]
fn test_sub_clip_matches_at_its_offset() {
    let rec = recognizer();
    let track = melody(5, VOICES_A, 30.0, SR);
    let a = save(&rec, "A", &track);

    // Start on a frame boundary 215 hops in (~9.98 s), ten seconds long
    let start = 215 * crate::fingerprint::HOP_SIZE;
    let clip = &track[start..start + 10 * SR as usize];
    let outcome = rec.search(clip, SR, secs(clip)).unwrap();

    let best = outcome.best().unwrap();
    assert_eq!(best.track_id, a.track_id);
    assert!(best.is_confident());
    let expected_ms = (start as u64 * 1000 / SR as u64) as i64;
    assert!(
        (i64::from(best.timestamp) - expected_ms).abs() <= 150,
        "timestamp {} not near {}",
        best.timestamp,
        expected_ms
    );
}

#[test]
fn test_unrelated_audio_is_rejected() {
    let rec = recognizer();
    save(&rec, "A", &melody(6, VOICES_A, 20.0, SR));

    let unrelated = melody(7, VOICES_B, 10.0, SR);
    let outcome = rec.search(&unrelated, SR, 10.0).unwrap();
    assert!(outcome.matches.iter().all(|m| !m.is_confident()));
}

#[test]
fn test_unrelated_audio_in_the_same_range_is_rejected() {
    let rec = recognizer();
    let tracks: Vec<Vec<f32>> = (0..5).map(|n| melody(200 + n, VOICES_A, 30.0, SR)).collect();
    let ids: Vec<i64> = tracks
        .iter()
        .enumerate()
        .map(|(n, samples)| save(&rec, &format!("T{n}"), samples).track_id)
        .collect();

    // Same voices, different notes: plenty of shared addresses, no shared alignment
    for n in 0..5 {
        let unrelated = melody(900 + n, VOICES_A, 10.0, SR);
        let outcome = rec.search(&unrelated, SR, 10.0).unwrap();
        for m in &outcome.matches {
            assert!(
                !m.is_confident(),
                "clip {n} matched {} with score {} ({:.3})",
                m.title,
                m.score,
                m.confidence
            );
        }
    }

    // Ten-second excerpts of the indexed tracks are still found
    let start = 100 * crate::fingerprint::HOP_SIZE;
    for (samples, &id) in tracks.iter().zip(&ids) {
        let clip = &samples[start..start + 10 * SR as usize];
        let outcome = rec.search(clip, SR, secs(clip)).unwrap();
        let best = outcome.best().unwrap();
        assert_eq!(best.track_id, id);
        assert!(best.is_confident());
    }
}

#[test]
fn test_empty_input_is_invalid() {
    let rec = recognizer();
    assert!(matches!(
        rec.search(&[], SR, 0.0),
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        rec.index_track(&[], SR, 0.0, 1),
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        rec.search(&[0.1; 64], 0, 1.0),
        Err(EngineError::InvalidInput(_))
    ));

    let err = rec
        .register_and_index(&NewTrack::new("A", "B", ""), &[], SR, 0.0, DuplicatePolicy::Reject)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(rec.index().track_count().unwrap(), 0);
}

#[test]
fn test_short_and_silent_input_is_no_match() {
    let rec = recognizer();
    save(&rec, "A", &melody(8, VOICES_A, 10.0, SR));

    let short = rec.search(&[0.2; 300], SR, 0.0).unwrap();
    assert!(short.is_no_match());
    let silence = rec.search(&vec![0.0; SR as usize * 3], SR, 3.0).unwrap();
    assert!(silence.is_no_match());
}

#[test]
fn test_failed_store_rolls_back_registration() {
    let rec = recognizer();
    rec.index().set_fail_writes(true);

    let track = NewTrack::new("Lost Song", "Nobody", "x");
    let err = rec
        .register_and_index(&track, &melody(9, VOICES_A, 10.0, SR), SR, 10.0, DuplicatePolicy::Reject)
        .unwrap_err();
    match err {
        EngineError::PartialIndexFailure { title, artist, .. } => {
            assert_eq!(title, "Lost Song");
            assert_eq!(artist, "Nobody");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!rec.index().track_exists_by_key(&track.key()).unwrap());
    assert_eq!(rec.index().track_count().unwrap(), 0);

    // The same track can be indexed once storage recovers
    rec.index().set_fail_writes(false);
    let samples = melody(9, VOICES_A, 10.0, SR);
    let indexed = rec
        .register_and_index(&track, &samples, SR, 10.0, DuplicatePolicy::Reject)
        .unwrap();
    assert!(indexed.fingerprints > 0);
}

#[test]
fn test_duplicate_policy() {
    let rec = recognizer();
    let samples = melody(10, VOICES_A, 10.0, SR);
    let first = save(&rec, "Song", &samples);

    let dup = NewTrack::new("song!", "SYNTH", "other");
    let err = rec
        .register_and_index(&dup, &samples, SR, 10.0, DuplicatePolicy::Reject)
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateTrack { .. }));

    let second = rec
        .register_and_index(&dup, &samples, SR, 10.0, DuplicatePolicy::Overwrite)
        .unwrap();
    assert!(second.replaced);
    assert!(second.track_id > first.track_id);
    assert!(rec.index().get_track(first.track_id).unwrap().is_none());

    let best = rec.search(&samples, SR, 10.0).unwrap();
    assert_eq!(best.matches.len(), 1);
    assert_eq!(best.matches[0].external_ref, "other");
}

#[test]
fn test_search_results_are_cached_until_write() {
    let rec = recognizer();
    let samples = melody(12, VOICES_A, 10.0, SR);
    save(&rec, "A", &samples);

    let first = rec.search(&samples, SR, 10.0).unwrap();
    assert!(!first.cached);
    let second = rec.search(&samples, SR, 10.0).unwrap();
    assert!(second.cached);
    assert_eq!(first.matches, second.matches);

    save(&rec, "B", &melody(13, VOICES_B, 10.0, SR));
    assert!(!rec.search(&samples, SR, 10.0).unwrap().cached);
}

#[test]
fn test_deleted_track_no_longer_matches() {
    let rec = recognizer();
    let samples = melody(14, VOICES_A, 10.0, SR);
    let a = save(&rec, "A", &samples);
    assert!(!rec.search(&samples, SR, 10.0).unwrap().is_no_match());

    rec.delete_track(a.track_id).unwrap();
    assert!(rec.search(&samples, SR, 10.0).unwrap().is_no_match());
}

#[test]
fn test_index_unavailable_differs_from_no_match() {
    let rec = recognizer();
    let samples = melody(15, VOICES_A, 10.0, SR);
    save(&rec, "A", &samples);
    rec.index().set_fail_lookups(true);

    let err = rec.search(&samples, SR, 10.0).unwrap_err();
    assert!(matches!(err, EngineError::IndexUnavailable(_)));
}

#[test]
fn test_index_track_under_existing_id() {
    let rec = recognizer();
    let id = rec
        .index()
        .register_track(&NewTrack::new("Pre", "Registered", ""))
        .unwrap();
    let samples = melody(16, VOICES_A, 10.0, SR);
    let count = rec.index_track(&samples, SR, 10.0, id).unwrap();
    assert!(count > 0);
    assert_eq!(rec.index().fingerprint_count(), count);
    assert_eq!(rec.search(&samples, SR, 10.0).unwrap().best().unwrap().track_id, id);
}

#[test]
fn test_concurrent_indexing_and_search() {
    let rec = recognizer();
    let tracks: Vec<Vec<f32>> = (0..4).map(|n| melody(100 + n, VOICES_A, 8.0, SR)).collect();

    std::thread::scope(|scope| {
        for (n, samples) in tracks.iter().enumerate() {
            let rec = &rec;
            scope.spawn(move || save(rec, &format!("T{n}"), samples));
        }
    });
    assert_eq!(rec.index().track_count().unwrap(), 4);

    std::thread::scope(|scope| {
        for (n, samples) in tracks.iter().enumerate() {
            let rec = &rec;
            scope.spawn(move || {
                let best = rec.search(samples, SR, 8.0).unwrap();
                assert_eq!(best.best().unwrap().title, format!("T{n}"));
            });
        }
    });
}

#[test]
fn test_dual_tone_scenario() {
    let rec = recognizer();
    let tone_a = mix(&[sine(600.0, 0.4, 5.0, SR), sine(3000.0, 0.4, 5.0, SR)]);
    let a = save(&rec, "Tone A", &tone_a);
    assert!(a.fingerprints > 0);

    let outcome = rec.search(&tone_a, SR, 5.0).unwrap();
    let best = outcome.best().unwrap();
    assert_eq!(best.track_id, a.track_id);
    assert_eq!(best.score, a.fingerprints as f64);
    assert_eq!(best.timestamp, 0);
    assert!(best.is_confident());

    // Tone B is never indexed
    let tone_b = mix(&[sine(300.0, 0.4, 5.0, SR), sine(1200.0, 0.4, 5.0, SR)]);
    let outcome = rec.search(&tone_b, SR, 5.0).unwrap();
    assert!(outcome.matches.iter().all(|m| !m.is_confident()));
}

#[test]
fn test_query_key_matches_contiguous_hash() {
    let samples: Vec<f32> = (0..2500).map(|i| (i as f32 * 0.01).sin()).collect();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&SR.to_le_bytes());
    hasher.update(&1.5f64.to_le_bytes());
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    hasher.update(&bytes);
    assert_eq!(query_key(&samples, SR, 1.5), *hasher.finalize().as_bytes());

    let mut changed = samples.clone();
    changed[2400] += 0.5;
    assert_ne!(query_key(&changed, SR, 1.5), query_key(&samples, SR, 1.5));
    assert_ne!(query_key(&samples, 8000, 1.5), query_key(&samples, SR, 1.5));
}
