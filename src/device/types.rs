//! Gaze sample types shared by every device backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Eyelid openness below which an eye counts as closed.
pub const CLOSED_OPENNESS_THRESHOLD: f64 = 0.2;

/// A single gaze sample.
///
/// Gaze coordinates are normalized to the scene frame (0.0 to 1.0 on both
/// axes). Optional fields are omitted by devices that do not report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Device timestamp of the sample
    pub timestamp: DateTime<Utc>,
    /// Normalized horizontal gaze position
    pub gaze_x: f64,
    /// Normalized vertical gaze position
    pub gaze_y: f64,
    /// Left pupil diameter in millimetres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pupil_left_mm: Option<f64>,
    /// Right pupil diameter in millimetres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pupil_right_mm: Option<f64>,
    /// Eyelid openness (0.0 closed, 1.0 fully open)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eyelid_openness: Option<f64>,
    /// Whether the device flagged this sample as part of a blink
    #[serde(default)]
    pub blink: bool,
}

impl GazeSample {
    pub fn new(gaze_x: f64, gaze_y: f64) -> Self {
        Self::at(Utc::now(), gaze_x, gaze_y)
    }

    pub fn at(timestamp: DateTime<Utc>, gaze_x: f64, gaze_y: f64) -> Self {
        Self {
            timestamp,
            gaze_x,
            gaze_y,
            pupil_left_mm: None,
            pupil_right_mm: None,
            eyelid_openness: None,
            blink: false,
        }
    }

    pub fn with_pupils(mut self, left_mm: f64, right_mm: f64) -> Self {
        self.pupil_left_mm = Some(left_mm);
        self.pupil_right_mm = Some(right_mm);
        self
    }

    pub fn with_openness(mut self, openness: f64) -> Self {
        self.eyelid_openness = Some(openness);
        self
    }

    pub fn blinking(mut self) -> Self {
        self.blink = true;
        self
    }

    /// Mean of the reported pupil diameters.
    pub fn pupil_diameter(&self) -> Option<f64> {
        match (self.pupil_left_mm, self.pupil_right_mm) {
            (Some(l), Some(r)) => Some((l + r) / 2.0),
            (Some(d), None) | (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }

    /// Whether the gaze position can be used for movement features.
    pub fn is_valid(&self) -> bool {
        !self.blink && self.gaze_x.is_finite() && self.gaze_y.is_finite()
    }

    pub fn eyes_closed(&self) -> bool {
        self.blink
            || self
                .eyelid_openness
                .map(|o| o < CLOSED_OPENNESS_THRESHOLD)
                .unwrap_or(false)
    }
}

/// A text frame carries either one sample or a batch of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum SampleFrame {
    One(GazeSample),
    Many(Vec<GazeSample>),
}

/// Decode a JSON frame into samples.
pub fn decode_samples(text: &str) -> Result<Vec<GazeSample>, serde_json::Error> {
    Ok(match serde_json::from_str(text)? {
        SampleFrame::One(sample) => vec![sample],
        SampleFrame::Many(samples) => samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pupil_diameter() {
        let both = GazeSample::new(0.5, 0.5).with_pupils(3.0, 4.0);
        assert!((both.pupil_diameter().unwrap() - 3.5).abs() < 1e-9);

        let mut left_only = GazeSample::new(0.5, 0.5);
        left_only.pupil_left_mm = Some(3.2);
        assert_eq!(left_only.pupil_diameter(), Some(3.2));

        assert_eq!(GazeSample::new(0.5, 0.5).pupil_diameter(), None);
    }

    #[test]
    fn test_eyes_closed() {
        assert!(GazeSample::new(0.5, 0.5).blinking().eyes_closed());
        assert!(GazeSample::new(0.5, 0.5).with_openness(0.1).eyes_closed());
        assert!(!GazeSample::new(0.5, 0.5).with_openness(0.8).eyes_closed());
        assert!(!GazeSample::new(0.5, 0.5).eyes_closed());
    }

    #[test]
    fn test_blink_sample_is_not_valid() {
        assert!(GazeSample::new(0.5, 0.5).is_valid());
        assert!(!GazeSample::new(0.5, 0.5).blinking().is_valid());
        assert!(!GazeSample::new(f64::NAN, 0.5).is_valid());
    }

    #[test]
    fn test_decode_single_and_batch() {
        let one = r#"{"timestamp":"2024-01-22T10:00:00Z","gaze_x":0.4,"gaze_y":0.6}"#;
        let samples = decode_samples(one).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(!samples[0].blink);
        assert_eq!(samples[0].pupil_left_mm, None);

        let many = r#"[
            {"timestamp":"2024-01-22T10:00:00Z","gaze_x":0.4,"gaze_y":0.6,"pupil_left_mm":3.1},
            {"timestamp":"2024-01-22T10:00:00.005Z","gaze_x":0.41,"gaze_y":0.6,"blink":true}
        ]"#;
        let samples = decode_samples(many).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].pupil_left_mm, Some(3.1));
        assert!(samples[1].blink);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_samples("not json").is_err());
        assert!(decode_samples(r#"{"gaze_x":0.4}"#).is_err());
    }
}
