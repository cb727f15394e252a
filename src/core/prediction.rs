//! Prediction types and the inference engine seam.
//!
//! The SDK does not ship a model. An [`InferenceEngine`] turns window
//! features into cognitive load and drowsiness predictions; without one the
//! pipeline still windows samples and computes features.

use crate::core::features::GazeFeatures;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Model name of the smoothed general cognitive load prediction.
pub const COG_LOAD_GENERAL_SMOOTHED: &str = "cog-load-general-smoothed";

/// Model name of the raw general cognitive load prediction.
pub const COG_LOAD_GENERAL: &str = "cog-load-general";

/// Cognitive load level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveLoadLevel {
    Low = 0,
    Moderate = 1,
    High = 2,
}

impl CognitiveLoadLevel {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Low),
            1 => Some(Self::Moderate),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }
}

impl fmt::Display for CognitiveLoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Drowsiness level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrowsinessLevel {
    Alert = 0,
    Mild = 1,
    Moderate = 2,
    Severe = 3,
}

impl DrowsinessLevel {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Alert),
            1 => Some(Self::Mild),
            2 => Some(Self::Moderate),
            3 => Some(Self::Severe),
            _ => None,
        }
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Alert => "Alert",
            Self::Mild => "Mild",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
        }
    }
}

impl fmt::Display for DrowsinessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label for a raw cognitive load value, including out-of-range values.
pub fn cog_load_label(value: u8) -> String {
    CognitiveLoadLevel::from_value(value)
        .map(|level| level.label().to_string())
        .unwrap_or_else(|| format!("Unknown ({value})"))
}

/// Label for a raw drowsiness value, including out-of-range values.
pub fn drowsiness_label(value: u8) -> String {
    DrowsinessLevel::from_value(value)
        .map(|level| level.label().to_string())
        .unwrap_or_else(|| format!("Unknown ({value})"))
}

/// A single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction<L> {
    /// End of the window the prediction covers
    pub timestamp: DateTime<Utc>,
    pub level: L,
    /// Model confidence in [0, 1]
    pub confidence: f64,
}

impl<L> Prediction<L> {
    pub fn new(timestamp: DateTime<Utc>, level: L, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            timestamp,
            level,
            confidence,
        }
    }
}

/// Cognitive load predictions keyed by model name.
pub type CogLoadLevels = BTreeMap<String, Prediction<CognitiveLoadLevel>>;

/// Latest cognitive load result of a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CogLoadUpdate {
    pub levels: CogLoadLevels,
    /// Number of the window that produced this result, starting at 1
    pub batch: u64,
}

impl CogLoadUpdate {
    /// The smoothed general prediction, or the first one reported.
    pub fn primary(&self) -> Option<&Prediction<CognitiveLoadLevel>> {
        primary_level(&self.levels)
    }
}

pub(crate) fn primary_level(levels: &CogLoadLevels) -> Option<&Prediction<CognitiveLoadLevel>> {
    levels
        .get(COG_LOAD_GENERAL_SMOOTHED)
        .or_else(|| levels.values().next())
}

/// Latest drowsiness result of a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessUpdate {
    pub prediction: Prediction<DrowsinessLevel>,
    /// Number of the window that produced this result, starting at 1
    pub batch: u64,
}

/// Result of offline prediction over a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction<L> {
    /// Seconds from the start of the recording to the end of the window
    pub offset_secs: f64,
    #[serde(flatten)]
    pub prediction: Prediction<L>,
}

/// Turns window features into predictions.
///
/// Implementations return `None` when a window does not carry enough signal
/// for a prediction.
pub trait InferenceEngine {
    fn cognitive_load(&mut self, features: &GazeFeatures, at: DateTime<Utc>) -> Option<CogLoadLevels>;

    fn drowsiness(
        &mut self,
        features: &GazeFeatures,
        at: DateTime<Utc>,
    ) -> Option<Prediction<DrowsinessLevel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_values() {
        assert_eq!(CognitiveLoadLevel::from_value(2), Some(CognitiveLoadLevel::High));
        assert_eq!(CognitiveLoadLevel::from_value(3), None);
        assert_eq!(CognitiveLoadLevel::Moderate.value(), 1);
        assert_eq!(DrowsinessLevel::from_value(3), Some(DrowsinessLevel::Severe));
        assert_eq!(DrowsinessLevel::Alert.value(), 0);
    }

    #[test]
    fn test_labels() {
        assert_eq!(cog_load_label(0), "Low");
        assert_eq!(cog_load_label(7), "Unknown (7)");
        assert_eq!(drowsiness_label(2), "Moderate");
        assert_eq!(drowsiness_label(9), "Unknown (9)");
        assert_eq!(CognitiveLoadLevel::High.to_string(), "High");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let now = Utc::now();
        assert_eq!(Prediction::new(now, DrowsinessLevel::Mild, 1.7).confidence, 1.0);
        assert_eq!(Prediction::new(now, DrowsinessLevel::Mild, -0.2).confidence, 0.0);
        assert_eq!(Prediction::new(now, DrowsinessLevel::Mild, f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_primary_prefers_smoothed() {
        let now = Utc::now();
        let mut levels = CogLoadLevels::new();
        levels.insert(
            COG_LOAD_GENERAL.to_string(),
            Prediction::new(now, CognitiveLoadLevel::High, 0.6),
        );
        let update = CogLoadUpdate {
            levels: levels.clone(),
            batch: 1,
        };
        assert_eq!(update.primary().unwrap().level, CognitiveLoadLevel::High);

        levels.insert(
            COG_LOAD_GENERAL_SMOOTHED.to_string(),
            Prediction::new(now, CognitiveLoadLevel::Low, 0.9),
        );
        let update = CogLoadUpdate { levels, batch: 2 };
        assert_eq!(update.primary().unwrap().level, CognitiveLoadLevel::Low);
    }

    #[test]
    fn test_batch_prediction_json_is_flat() {
        let result = BatchPrediction {
            offset_secs: 21.0,
            prediction: Prediction::new(Utc::now(), CognitiveLoadLevel::Moderate, 0.8),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["offset_secs"], 21.0);
        assert_eq!(json["level"], "moderate");
        assert_eq!(json["confidence"], 0.8);
    }
}
