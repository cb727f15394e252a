//! Core processing for the Theia SDK.
//!
//! This module contains:
//! - Window management for grouping gaze samples into time windows
//! - Feature computation from sample windows
//! - Prediction types and the inference engine seam
//! - The per-session processing pipeline
//! - Session snapshots for export

pub mod features;
pub mod pipeline;
pub mod prediction;
pub mod snapshot;
pub mod windowing;

// Re-export commonly used types
pub use features::{compute_features, compute_features_in, GazeFeatures};
pub use pipeline::{
    predict_cog_load_batch, predict_drowsiness_batch, Pipeline, PipelineSettings,
    COG_LOAD_BATCH_STRIDE, EXPIRY_GRACE,
};
pub use prediction::{
    cog_load_label, drowsiness_label, BatchPrediction, CogLoadLevels, CogLoadUpdate,
    CognitiveLoadLevel, DrowsinessLevel, DrowsinessUpdate, InferenceEngine, Prediction,
    COG_LOAD_GENERAL, COG_LOAD_GENERAL_SMOOTHED,
};
pub use snapshot::{SessionSnapshot, SnapshotBuilder, WindowKind, PRODUCER_NAME};
pub use windowing::{sliding_windows, span, InvalidSpan, SampleWindow, WindowManager};
