//! Feature computation from gaze sample windows.
//!
//! Features are generic oculometric measures (pupil size, blink activity, eye
//! closure, gaze speed). They are the input handed to the inference engine.

use crate::core::windowing::SampleWindow;
use crate::device::GazeSample;
use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Features computed for one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeFeatures {
    /// Number of samples in the window
    pub sample_count: usize,
    /// Window length in seconds
    pub duration_secs: f64,
    /// Observed sampling rate
    pub sampling_rate_hz: f64,
    /// Fraction of samples with a usable gaze position
    pub valid_ratio: f64,
    /// Mean pupil diameter in millimetres
    pub pupil_mean_mm: Option<f64>,
    /// Standard deviation of pupil diameter in millimetres
    pub pupil_std_mm: Option<f64>,
    /// Number of blink onsets
    pub blink_count: u32,
    /// Blink onsets per minute
    pub blink_rate_per_min: f64,
    /// Fraction of samples with the eyes closed
    pub eye_closure_ratio: f64,
    /// Mean gaze speed in normalized units per second
    pub mean_gaze_speed: f64,
    /// Local hour of day at the window start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_hour: Option<u32>,
}

/// Compute features for a window, with time of day in UTC.
pub fn compute_features(window: &SampleWindow) -> GazeFeatures {
    compute_features_in(window, Tz::UTC)
}

/// Compute features for a window, with time of day in `tz`.
pub fn compute_features_in(window: &SampleWindow, tz: Tz) -> GazeFeatures {
    let samples = &window.samples;
    let duration_secs = window.duration_secs();

    if samples.is_empty() || duration_secs <= 0.0 {
        return GazeFeatures {
            duration_secs: duration_secs.max(0.0),
            ..GazeFeatures::default()
        };
    }

    let count = samples.len();
    let valid = samples.iter().filter(|s| s.is_valid()).count();
    let closed = samples.iter().filter(|s| s.eyes_closed()).count();

    let (pupil_mean_mm, pupil_std_mm) = pupil_stats(samples);
    let blink_count = blink_onsets(samples);

    GazeFeatures {
        sample_count: count,
        duration_secs,
        sampling_rate_hz: count as f64 / duration_secs,
        valid_ratio: valid as f64 / count as f64,
        pupil_mean_mm,
        pupil_std_mm,
        blink_count,
        blink_rate_per_min: blink_count as f64 * 60.0 / duration_secs,
        eye_closure_ratio: closed as f64 / count as f64,
        mean_gaze_speed: mean_gaze_speed(samples),
        local_hour: Some(window.start.with_timezone(&tz).hour()),
    }
}

fn pupil_stats(samples: &[GazeSample]) -> (Option<f64>, Option<f64>) {
    let diameters: Vec<f64> = samples
        .iter()
        .filter(|s| !s.blink)
        .filter_map(|s| s.pupil_diameter())
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();

    let mean = if diameters.is_empty() {
        None
    } else {
        Some(diameters.iter().mean())
    };
    let std = if diameters.len() < 2 {
        None
    } else {
        Some(diameters.iter().std_dev())
    };
    (mean, std)
}

/// Count transitions into a closed-eye state.
fn blink_onsets(samples: &[GazeSample]) -> u32 {
    let mut count = 0;
    let mut was_closed = false;
    for sample in samples {
        let closed = sample.blink;
        if closed && !was_closed {
            count += 1;
        }
        was_closed = closed;
    }
    count
}

fn mean_gaze_speed(samples: &[GazeSample]) -> f64 {
    let valid: Vec<&GazeSample> = samples.iter().filter(|s| s.is_valid()).collect();

    let speeds: Vec<f64> = valid
        .windows(2)
        .filter_map(|pair| {
            let dt = (pair[1].timestamp - pair[0].timestamp).num_microseconds()? as f64 / 1e6;
            if dt <= 0.0 {
                return None;
            }
            let dx = pair[1].gaze_x - pair[0].gaze_x;
            let dy = pair[1].gaze_y - pair[0].gaze_y;
            Some((dx * dx + dy * dy).sqrt() / dt)
        })
        .collect();

    if speeds.is_empty() {
        0.0
    } else {
        speeds.iter().mean()
    }
}
