//! Separation fallback and stem validation tests

mod common;

use common::{track_ids, Script, TestHarness};
use stemforge::pipeline::{ErrorKind, Profile};
use stemforge_common::{PlaylistStatus, SourceKind, StemKey, StemStatus, StemType, TrackId, TrackStatus};

fn attempts(h: &TestHarness) -> Vec<(String, String)> {
    h.engine
        .calls()
        .into_iter()
        .map(|c| (c.model, c.device))
        .collect()
}

fn pair(model: &str, device: &str) -> (String, String) {
    (model.to_string(), device.to_string())
}

#[tokio::test]
async fn test_exhaustion_on_both_devices_moves_to_next_model() {
    let h = TestHarness::new();
    h.engine.script("A", "fast", Script::Exhaust);
    h.engine.script("A", "slow", Script::Exhaust);

    let summary = h
        .orchestrator()
        .start_run(track_ids(&["T1"]), h.channels(), Profile::Full)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(
        attempts(&h),
        vec![pair("A", "fast"), pair("A", "slow"), pair("B", "fast")]
    );

    let t1 = TrackId::from("T1");
    for stem in [StemType::Acapella, StemType::Drums] {
        let checkpoint = h.checkpoints.stem(&StemKey::new(&t1, stem)).unwrap();
        assert_eq!(checkpoint.status, StemStatus::Completed);
        assert_eq!(checkpoint.model.as_deref(), Some("B"));
    }
}

#[tokio::test]
async fn test_generic_failure_skips_fallback_device() {
    let h = TestHarness::new();
    h.engine.script("A", "fast", Script::Fail);

    let summary = h
        .orchestrator()
        .start_run(track_ids(&["T1"]), h.channels(), Profile::Lightweight)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(attempts(&h), vec![pair("A", "fast"), pair("B", "fast")]);
}

#[tokio::test]
async fn test_exhausted_chain_fails_track_without_stems() {
    let h = TestHarness::new();
    for model in ["A", "B"] {
        for device in ["fast", "slow"] {
            h.engine.script(model, device, Script::Exhaust);
        }
    }

    let summary = h
        .orchestrator()
        .start_run(track_ids(&["T1"]), h.channels(), Profile::Full)
        .await
        .unwrap();

    // Two models, at most two attempts each.
    assert_eq!(h.engine.calls().len(), 4);
    assert_eq!(summary.status, PlaylistStatus::Failed);
    let failure = &summary.failed[0];
    assert_eq!(failure.kind, ErrorKind::SeparationExhausted);
    assert_eq!(failure.last_stage, Some(TrackStatus::Fetching));

    let t1 = TrackId::from("T1");
    assert!(h.checkpoints.stems_for_track(&t1).is_empty());
    assert_eq!(
        h.checkpoints.track(&t1).unwrap().meta.error_kind.as_deref(),
        Some("separation_exhausted")
    );
    assert_eq!(h.mixer.mixes(), 0);
}

#[tokio::test]
async fn test_undersized_required_stem_fails_validation() {
    let h = TestHarness::new();
    h.engine.source_size(SourceKind::Drums, 100);

    let summary = h
        .orchestrator()
        .start_run(track_ids(&["T1"]), h.channels(), Profile::Full)
        .await
        .unwrap();

    let failure = &summary.failed[0];
    assert_eq!(failure.kind, ErrorKind::Validation);
    assert_eq!(failure.last_stage, Some(TrackStatus::Separating));

    let t1 = TrackId::from("T1");
    let drums = h
        .checkpoints
        .stem(&StemKey::new(&t1, StemType::Drums))
        .unwrap();
    assert_eq!(drums.status, StemStatus::Invalid);
    let vocals = h
        .checkpoints
        .stem(&StemKey::new(&t1, StemType::Acapella))
        .unwrap();
    assert_eq!(vocals.status, StemStatus::Completed);
    assert!(h.publisher.published().is_empty());
}

#[tokio::test]
async fn test_invalid_optional_stem_is_left_out() {
    let mut h = TestHarness::new();
    h.config.channels[0].optional_stems = vec![StemType::Bass];
    h.engine.source_size(SourceKind::Bass, 100);

    let summary = h
        .orchestrator()
        .start_run(track_ids(&["T1"]), h.channels(), Profile::Full)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(
        h.engine.calls()[0].sources.iter().copied().collect::<Vec<_>>(),
        vec![SourceKind::Vocals, SourceKind::Drums, SourceKind::Bass]
    );

    let t1 = TrackId::from("T1");
    let bass = h
        .checkpoints
        .stem(&StemKey::new(&t1, StemType::Bass))
        .unwrap();
    assert_eq!(bass.status, StemStatus::Invalid);

    let published: Vec<StemType> = h.publisher.published().iter().map(|r| r.stem).collect();
    assert_eq!(published, vec![StemType::Acapella, StemType::Drums]);
}

#[tokio::test]
async fn test_mixed_stem_combines_its_sources() {
    let mut h = TestHarness::new();
    h.config.channels[0].stems = vec![StemType::Instrumental];

    let summary = h
        .orchestrator()
        .start_run(track_ids(&["T1"]), h.channels(), Profile::Lightweight)
        .await
        .unwrap();

    assert!(summary.is_success());
    let t1 = TrackId::from("T1");
    let instrumental = h
        .checkpoints
        .stem(&StemKey::new(&t1, StemType::Instrumental))
        .unwrap();
    // other + drums + bass
    assert_eq!(instrumental.size_bytes, Some(3 * common::SOURCE_BYTES as u64));
    assert_eq!(instrumental.fingerprint.as_ref().map(|f| f.len()), Some(64));
}
