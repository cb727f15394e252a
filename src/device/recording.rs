//! Recorded gaze data for offline prediction.
//!
//! Two formats are read. Files ending in `.csv` are parsed as CSV with
//! columns matched by header name, which covers Pupil Cloud
//! `gaze_and_eye_state.csv` exports as well as CSV files using the
//! [`GazeSample`] field names. Anything else is read as newline-delimited
//! [`GazeSample`] JSON, one sample or array of samples per line.

use crate::device::types::{decode_samples, GazeSample};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Eyelid aperture treated as a fully open eye.
pub const OPEN_EYELID_APERTURE_MM: f64 = 10.0;

/// Errors that can occur while reading a recording.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Recording has no {0} column")]
    MissingColumn(&'static str),

    #[error("Line {line}: invalid {column} value '{value}'")]
    InvalidValue {
        line: u64,
        column: &'static str,
        value: String,
    },

    #[error("Line {line}: invalid gaze sample: {source}")]
    Json {
        line: u64,
        source: serde_json::Error,
    },
}

/// Resolution of the scene camera that pixel gaze coordinates refer to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneCamera {
    pub width: f64,
    pub height: f64,
}

impl Default for SceneCamera {
    /// The Neon scene camera (1600 x 1200).
    fn default() -> Self {
        Self {
            width: 1600.0,
            height: 1200.0,
        }
    }
}

/// Load a recording, choosing the format from the file extension.
pub fn load_recording(path: &Path, camera: &SceneCamera) -> Result<Vec<GazeSample>, RecordingError> {
    let file = File::open(path).map_err(|source| RecordingError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let samples = if is_csv {
        read_csv(file, camera)?
    } else {
        read_ndjson(BufReader::new(file)).map_err(|e| match e {
            RecordingError::Io { source, .. } => RecordingError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?
    };

    tracing::info!(
        path = %path.display(),
        samples = samples.len(),
        "Recording loaded"
    );
    Ok(samples)
}

/// Read newline-delimited sample JSON. Blank lines are skipped.
pub fn read_ndjson<R: BufRead>(reader: R) -> Result<Vec<GazeSample>, RecordingError> {
    let mut samples = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| RecordingError::Io {
            path: PathBuf::new(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let decoded = decode_samples(line).map_err(|source| RecordingError::Json {
            line: index as u64 + 1,
            source,
        })?;
        samples.extend(decoded);
    }
    Ok(samples)
}

enum TimeColumn {
    /// Unix time in nanoseconds
    UnixNanos(usize),
    /// RFC 3339 timestamp
    Rfc3339(usize),
}

enum GazeColumn {
    Pixels(usize),
    Normalized(usize),
}

enum BlinkColumn {
    /// Non-empty while the sample belongs to a blink
    BlinkId(usize),
    /// `true`/`false` or `1`/`0`
    Flag(usize),
}

enum OpennessColumn {
    Normalized(usize),
    /// Left and right eyelid aperture in millimetres
    Aperture(usize, usize),
}

struct Columns {
    timestamp: TimeColumn,
    gaze_x: GazeColumn,
    gaze_y: GazeColumn,
    pupil_left: Option<usize>,
    pupil_right: Option<usize>,
    blink: Option<BlinkColumn>,
    openness: Option<OpennessColumn>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, RecordingError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let find = |name: &str| names.iter().position(|h| h == name);

        let timestamp = match (find("timestamp [ns]"), find("timestamp")) {
            (Some(i), _) => TimeColumn::UnixNanos(i),
            (None, Some(i)) => TimeColumn::Rfc3339(i),
            _ => return Err(RecordingError::MissingColumn("timestamp")),
        };
        let gaze = |pixels: &str, normalized: &str, column: &'static str| {
            match (find(pixels), find(normalized)) {
                (Some(i), _) => Ok(GazeColumn::Pixels(i)),
                (None, Some(i)) => Ok(GazeColumn::Normalized(i)),
                _ => Err(RecordingError::MissingColumn(column)),
            }
        };

        Ok(Self {
            timestamp,
            gaze_x: gaze("gaze x [px]", "gaze_x", "gaze x")?,
            gaze_y: gaze("gaze y [px]", "gaze_y", "gaze y")?,
            pupil_left: find("pupil diameter left [mm]").or_else(|| find("pupil_left_mm")),
            pupil_right: find("pupil diameter right [mm]").or_else(|| find("pupil_right_mm")),
            blink: find("blink id")
                .map(BlinkColumn::BlinkId)
                .or_else(|| find("blink").map(BlinkColumn::Flag)),
            openness: match (
                find("eyelid_openness"),
                find("eyelid aperture left [mm]"),
                find("eyelid aperture right [mm]"),
            ) {
                (Some(i), _, _) => Some(OpennessColumn::Normalized(i)),
                (None, Some(l), Some(r)) => Some(OpennessColumn::Aperture(l, r)),
                _ => None,
            },
        })
    }
}

/// Read a CSV recording. Pixel gaze coordinates are normalized by `camera`.
pub fn read_csv<R: Read>(reader: R, camera: &SceneCamera) -> Result<Vec<GazeSample>, RecordingError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        samples.push(parse_record(&record, &columns, camera, line)?);
    }
    Ok(samples)
}

fn parse_record(
    record: &csv::StringRecord,
    columns: &Columns,
    camera: &SceneCamera,
    line: u64,
) -> Result<GazeSample, RecordingError> {
    let text = |index: usize| record.get(index).filter(|v| !v.is_empty());
    let invalid = |column: &'static str, value: &str| RecordingError::InvalidValue {
        line,
        column,
        value: value.to_string(),
    };
    let number = |index: usize, column: &'static str| -> Result<Option<f64>, RecordingError> {
        match text(index) {
            None => Ok(None),
            Some(value) => value
                .parse::<f64>()
                .map(|n| Some(n).filter(|n| n.is_finite()))
                .map_err(|_| invalid(column, value)),
        }
    };

    let timestamp = match columns.timestamp {
        TimeColumn::UnixNanos(i) => {
            let value = text(i).unwrap_or_default();
            value
                .parse::<i64>()
                .ok()
                .and_then(|ns| {
                    DateTime::<Utc>::from_timestamp(
                        ns.div_euclid(1_000_000_000),
                        ns.rem_euclid(1_000_000_000) as u32,
                    )
                })
                .ok_or_else(|| invalid("timestamp", value))?
        }
        TimeColumn::Rfc3339(i) => {
            let value = text(i).unwrap_or_default();
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| invalid("timestamp", value))?
        }
    };

    // Missing gaze (e.g. device not worn) becomes NaN, an invalid sample
    let gaze = |column: &GazeColumn, extent: f64, name: &'static str| -> Result<f64, RecordingError> {
        Ok(match *column {
            GazeColumn::Pixels(i) => number(i, name)?.map(|px| px / extent),
            GazeColumn::Normalized(i) => number(i, name)?,
        }
        .unwrap_or(f64::NAN))
    };

    let mut sample = GazeSample::at(
        timestamp,
        gaze(&columns.gaze_x, camera.width, "gaze x")?,
        gaze(&columns.gaze_y, camera.height, "gaze y")?,
    );

    if let Some(i) = columns.pupil_left {
        sample.pupil_left_mm = number(i, "pupil diameter left")?;
    }
    if let Some(i) = columns.pupil_right {
        sample.pupil_right_mm = number(i, "pupil diameter right")?;
    }

    sample.blink = match columns.blink {
        Some(BlinkColumn::BlinkId(i)) => text(i).is_some(),
        Some(BlinkColumn::Flag(i)) => match text(i) {
            None => false,
            Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => true,
            Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => false,
            Some(v) => return Err(invalid("blink", v)),
        },
        None => false,
    };

    sample.eyelid_openness = match columns.openness {
        Some(OpennessColumn::Normalized(i)) => number(i, "eyelid openness")?,
        Some(OpennessColumn::Aperture(l, r)) => {
            let left = number(l, "eyelid aperture left")?;
            let right = number(r, "eyelid aperture right")?;
            let aperture = match (left, right) {
                (Some(l), Some(r)) => Some((l + r) / 2.0),
                (Some(a), None) | (None, Some(a)) => Some(a),
                (None, None) => None,
            };
            aperture.map(|mm| (mm / OPEN_EYELID_APERTURE_MM).clamp(0.0, 1.0))
        }
        None => None,
    };

    Ok(sample)
}
