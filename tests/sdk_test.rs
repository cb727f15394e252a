//! Integration tests for the SDK handle with in-memory and local sources

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::thread;
use std::time::Duration;
use theia_sdk::core::{CogLoadLevels, WindowKind, COG_LOAD_GENERAL_SMOOTHED};
use theia_sdk::{
    load_recording, CognitiveLoadLevel, DrowsinessLevel, GazeFeatures, GazeSample,
    InferenceEngine, Platform, Prediction, ReplaySource, SceneCamera, SdkError, SessionSnapshot,
    TheiaSdk,
};

/// Reports high load for windows with blinks and moderate drowsiness always.
struct StubEngine;

impl InferenceEngine for StubEngine {
    fn cognitive_load(&mut self, features: &GazeFeatures, at: DateTime<Utc>) -> Option<CogLoadLevels> {
        let level = if features.blink_count > 0 {
            CognitiveLoadLevel::High
        } else {
            CognitiveLoadLevel::Low
        };
        let mut levels = CogLoadLevels::new();
        levels.insert(
            COG_LOAD_GENERAL_SMOOTHED.to_string(),
            Prediction::new(at, level, 0.8),
        );
        Some(levels)
    }

    fn drowsiness(&mut self, _features: &GazeFeatures, at: DateTime<Utc>) -> Option<Prediction<DrowsinessLevel>> {
        Some(Prediction::new(at, DrowsinessLevel::Moderate, 0.7))
    }
}

fn window_sizes(snapshots: &[SessionSnapshot], kind: WindowKind) -> Vec<usize> {
    snapshots
        .iter()
        .filter(|s| s.kind == kind)
        .map(|s| s.features.sample_count)
        .collect()
}

/// 10 Hz samples starting one hour ago.
fn past_recording(seconds: i64) -> Vec<GazeSample> {
    let origin = Utc::now() - ChronoDuration::hours(1);
    (0..seconds * 10)
        .map(|i| {
            GazeSample::at(origin + ChronoDuration::milliseconds(i * 100), 0.4, 0.6)
                .with_pupils(3.1, 3.3)
                .with_openness(0.9)
        })
        .collect()
}

#[test]
fn test_realtime_session_end_to_end() {
    let mut sdk = TheiaSdk::new("abc123", "PL")
        .expect("Failed to create SDK")
        .with_engine(Box::new(StubEngine))
        .with_source(Box::new(ReplaySource::new(past_recording(12))));

    let session_id = sdk.start_new_session(None).unwrap();
    sdk.start_realtime_data().unwrap();
    assert!(sdk.is_streaming());

    // Windows the stream has moved past are closed; the last one stays open
    let cog = sdk.get_cog_load_levels().expect("No cognitive load update");
    assert_eq!(cog.batch, 2);
    assert_eq!(cog.primary().unwrap().level, CognitiveLoadLevel::Low);
    assert!(cog.levels.contains_key(COG_LOAD_GENERAL_SMOOTHED));
    assert!(sdk.get_drowsiness_level().is_none());

    let features = sdk.latest_features().expect("No features");
    assert_eq!(features.sample_count, 50);

    let snapshots = sdk.stop_processing().unwrap();
    assert!(!sdk.is_streaming());
    assert_eq!(snapshots.len(), 4);
    assert!(snapshots.iter().all(|s| s.session_id == session_id));
    assert_eq!(window_sizes(&snapshots, WindowKind::CognitiveLoad), vec![50, 50, 20]);
    assert_eq!(window_sizes(&snapshots, WindowKind::Drowsiness), vec![120]);

    let cog = sdk.get_cog_load_levels().expect("No cognitive load update");
    assert_eq!(cog.batch, 3);
    let drowsy = sdk.get_drowsiness_level().expect("No drowsiness update");
    assert_eq!(drowsy.batch, 1);
    assert_eq!(drowsy.prediction.level, DrowsinessLevel::Moderate);

    assert_eq!(sdk.session_stats().samples_received, 120);
    let stats = sdk.log().stats();
    assert_eq!(stats.samples_received, 120);
    assert_eq!(stats.samples_dropped, 0);
    assert_eq!(stats.windows_completed, 4);
    assert_eq!(stats.cog_load_predictions, 3);
    assert_eq!(stats.drowsiness_predictions, 1);

    // A second stop is reported, not ignored
    assert!(matches!(sdk.stop_processing(), Err(SdkError::NotStreaming)));
}

#[test]
fn test_polling_without_engine_returns_none() {
    let mut sdk = TheiaSdk::new("abc123", Platform::PupilLabsNeon)
        .unwrap()
        .with_source(Box::new(ReplaySource::new(past_recording(6))));

    sdk.start_new_session(None).unwrap();
    sdk.start_realtime_data().unwrap();

    assert!(sdk.get_cog_load_levels().is_none());
    assert!(sdk.get_drowsiness_level().is_none());
    assert!(sdk.latest_features().is_some());

    let snapshots = sdk.stop_processing().unwrap();
    assert!(snapshots.iter().all(|s| s.cog_load.is_none() && s.drowsiness.is_none()));
}

#[test]
fn test_polling_before_session_is_empty() {
    let mut sdk = TheiaSdk::new("abc123", "Ganzin").unwrap();
    assert!(sdk.get_cog_load_levels().is_none());
    assert!(sdk.get_drowsiness_level().is_none());
    assert!(sdk.session_id().is_none());
}

#[test]
fn test_batch_prediction_through_sdk() {
    let mut sdk = TheiaSdk::new("abc123", "PL")
        .unwrap()
        .with_engine(Box::new(StubEngine));

    let samples = past_recording(50);

    let cog = sdk.predict_cog_load_batch(&samples).unwrap();
    assert_eq!(cog.len(), 30);
    assert!((cog[0].offset_secs - 20.0).abs() < 1e-9);

    let drowsy = sdk
        .predict_drowsiness_batch(&samples, chrono_tz::Europe::Berlin, Duration::from_secs(10))
        .unwrap();
    // Recording is shorter than one drowsiness window
    assert!(drowsy.is_empty());

    assert!(matches!(
        sdk.predict_drowsiness_batch(&samples, chrono_tz::Tz::UTC, Duration::ZERO),
        Err(SdkError::InvalidStride)
    ));
}

#[test]
fn test_local_capture_from_file() {
    let path = std::env::temp_dir().join(format!("theia-capture-{}.ndjson", uuid::Uuid::new_v4()));
    let lines: Vec<String> = past_recording(6)
        .iter()
        .map(|s| serde_json::to_string(s).unwrap())
        .collect();
    std::fs::write(&path, lines.join("\n")).unwrap();

    let mut sdk = TheiaSdk::new("abc123", "PL").unwrap();
    sdk.set_capture_path(Some(path.clone())).unwrap();
    sdk.start_new_session(None).unwrap();
    sdk.start_realtime_data().unwrap();

    // The capture thread reads the file in the background
    for _ in 0..50 {
        sdk.get_cog_load_levels();
        if sdk.log().stats().samples_received == 60 {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(sdk.log().stats().samples_received, 60);

    let snapshots = sdk.stop_processing().unwrap();
    // Every sample lands in exactly one window of each kind
    assert_eq!(window_sizes(&snapshots, WindowKind::CognitiveLoad), vec![50, 10]);
    assert_eq!(window_sizes(&snapshots, WindowKind::Drowsiness), vec![60]);
    assert_eq!(sdk.log().stats().samples_dropped, 0);

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_batch_prediction_from_csv_export() {
    let path = std::env::temp_dir().join(format!("theia-export-{}.csv", uuid::Uuid::new_v4()));
    let start_ns: i64 = 1_705_917_600_000_000_000;
    let mut csv = String::from(
        "section id,recording id,timestamp [ns],gaze x [px],gaze y [px],worn,blink id,\
         pupil diameter left [mm],pupil diameter right [mm],\
         eyelid aperture left [mm],eyelid aperture right [mm]\n",
    );
    // 30 seconds at 10 Hz
    for i in 0..300i64 {
        csv.push_str(&format!(
            "s1,r1,{},800,600,1,,3.1,3.3,9.0,9.0\n",
            start_ns + i * 100_000_000
        ));
    }
    std::fs::write(&path, csv).unwrap();

    let samples = load_recording(&path, &SceneCamera::default()).unwrap();
    assert_eq!(samples.len(), 300);
    assert_eq!(samples[0].gaze_x, 0.5);
    assert_eq!(samples[0].gaze_y, 0.5);

    let mut sdk = TheiaSdk::new("abc123", "PL")
        .unwrap()
        .with_engine(Box::new(StubEngine));
    let cog = sdk.predict_cog_load_batch(&samples).unwrap();
    // One result per second from 20s to the end of the recording
    assert_eq!(cog.len(), 10);
    assert!(cog.iter().all(|p| p.prediction.level == CognitiveLoadLevel::Low));

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_missing_capture_file_fails_to_start() {
    let mut sdk = TheiaSdk::new("abc123", "PL").unwrap();
    sdk.set_capture_path(Some(std::env::temp_dir().join("theia-no-such-capture.ndjson")))
        .unwrap();
    sdk.start_new_session(None).unwrap();

    assert!(matches!(sdk.start_realtime_data(), Err(SdkError::Device(_))));
    assert!(!sdk.is_streaming());
}
