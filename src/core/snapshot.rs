//! Per-window session snapshots for export.
//!
//! Each completed window yields one snapshot carrying its features and any
//! predictions made for it, tagged with the producer and session identity.

use crate::core::features::GazeFeatures;
use crate::core::prediction::{CogLoadLevels, DrowsinessLevel, Prediction};
use crate::core::windowing::SampleWindow;
use crate::platform::Platform;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The name of this producer.
pub const PRODUCER_NAME: &str = "theia-sdk";

/// Which analysis a window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    CognitiveLoad,
    Drowsiness,
}

/// Producer metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Snapshot of one completed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub platform: Platform,
    pub producer: Producer,
    pub kind: WindowKind,
    /// Window number within the session and kind, starting at 1
    pub batch: u64,
    /// Window start time (RFC3339)
    pub window_start: String,
    /// Window end time (RFC3339)
    pub window_end: String,
    pub session_start: bool,
    /// When this snapshot was computed (RFC3339)
    pub computed_at_utc: String,
    pub features: GazeFeatures,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cog_load: Option<CogLoadLevels>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drowsiness: Option<Prediction<DrowsinessLevel>>,
}

/// Builds snapshots for one session.
pub struct SnapshotBuilder {
    session_id: Uuid,
    platform: Platform,
    producer: Producer,
}

impl SnapshotBuilder {
    pub fn new(session_id: Uuid, platform: Platform) -> Self {
        let host = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().to_string());

        Self {
            session_id,
            platform,
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: Uuid::new_v4(),
                host,
            },
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn instance_id(&self) -> Uuid {
        self.producer.instance_id
    }

    pub fn cognitive_load(
        &self,
        batch: u64,
        window: &SampleWindow,
        features: &GazeFeatures,
        levels: Option<CogLoadLevels>,
    ) -> SessionSnapshot {
        let mut snapshot = self.base(WindowKind::CognitiveLoad, batch, window, features);
        snapshot.cog_load = levels;
        snapshot
    }

    pub fn drowsiness(
        &self,
        batch: u64,
        window: &SampleWindow,
        features: &GazeFeatures,
        prediction: Option<Prediction<DrowsinessLevel>>,
    ) -> SessionSnapshot {
        let mut snapshot = self.base(WindowKind::Drowsiness, batch, window, features);
        snapshot.drowsiness = prediction;
        snapshot
    }

    fn base(
        &self,
        kind: WindowKind,
        batch: u64,
        window: &SampleWindow,
        features: &GazeFeatures,
    ) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            platform: self.platform,
            producer: self.producer.clone(),
            kind,
            batch,
            window_start: window.start.to_rfc3339(),
            window_end: window.end.to_rfc3339(),
            session_start: window.is_session_start,
            computed_at_utc: Utc::now().to_rfc3339(),
            features: features.clone(),
            cog_load: None,
            drowsiness: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::compute_features;
    use crate::device::GazeSample;
    use chrono::Duration;

    #[test]
    fn test_snapshot_fields() {
        let session_id = Uuid::new_v4();
        let builder = SnapshotBuilder::new(session_id, Platform::GanzinSol);

        let start = Utc::now();
        let mut window = SampleWindow::new(start, Duration::seconds(120));
        window.add_sample(GazeSample::at(start, 0.5, 0.5));
        window.is_session_start = true;
        let features = compute_features(&window);

        let prediction = Prediction::new(window.end, DrowsinessLevel::Mild, 0.7);
        let snapshot = builder.drowsiness(1, &window, &features, Some(prediction));

        assert_eq!(snapshot.session_id, session_id);
        assert_eq!(snapshot.kind, WindowKind::Drowsiness);
        assert!(snapshot.session_start);
        assert!(snapshot.cog_load.is_none());
        assert_eq!(snapshot.producer.name, PRODUCER_NAME);
        assert_eq!(snapshot.producer.instance_id, builder.instance_id());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["platform"], "Ganzin");
        assert_eq!(json["kind"], "drowsiness");
        assert_eq!(json["drowsiness"]["level"], "mild");
        assert!(json.get("cog_load").is_none());
    }
}
