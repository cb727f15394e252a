//! Window management for grouping gaze samples into time windows.
//!
//! Live streams use tumbling windows: the first sample opens a window and
//! later windows stay aligned to it until a gap in the stream starts a new
//! series. Recordings can also be cut into overlapping windows with
//! [`sliding_windows`].

use crate::device::GazeSample;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A window length, stride or threshold that cannot be used for windowing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} of {value:?} is out of range")]
pub struct InvalidSpan {
    pub name: &'static str,
    pub value: std::time::Duration,
}

/// Convert a window length or stride into a chrono duration.
///
/// Spans shorter than 1ms or too long to represent are rejected.
pub fn span(name: &'static str, value: std::time::Duration) -> Result<Duration, InvalidSpan> {
    match Duration::from_std(value) {
        Ok(duration) if duration >= Duration::milliseconds(1) => Ok(duration),
        _ => Err(InvalidSpan { name, value }),
    }
}

/// A time window containing gaze samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleWindow {
    /// Start time of the window
    pub start: DateTime<Utc>,
    /// End time of the window (exclusive)
    pub end: DateTime<Utc>,
    /// Samples in this window
    pub samples: Vec<GazeSample>,
    /// Whether this window opens a new series after a gap
    pub is_session_start: bool,
}

impl SampleWindow {
    /// Create a new empty window starting at the given time.
    ///
    /// The end saturates at the latest representable instant.
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            end: start
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            samples: Vec::new(),
            is_session_start: false,
        }
    }

    pub fn add_sample(&mut self, sample: GazeSample) {
        self.samples.push(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Get the duration of this window in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

/// Manages the collection of samples into tumbling windows.
pub struct WindowManager {
    window_duration: Duration,
    session_gap_threshold: Duration,
    current_window: Option<SampleWindow>,
    completed_windows: Vec<SampleWindow>,
    last_sample_time: Option<DateTime<Utc>>,
}

impl WindowManager {
    /// Create a manager from validated spans (see [`span`]).
    pub fn new(window_duration: Duration, session_gap_threshold: Duration) -> Self {
        Self {
            window_duration,
            session_gap_threshold,
            current_window: None,
            completed_windows: Vec::new(),
            last_sample_time: None,
        }
    }

    /// Process an incoming sample.
    ///
    /// A gap longer than the session threshold closes the current window and
    /// restarts alignment at the new sample. Otherwise a sample past the
    /// current window's end closes it and opens the aligned window that
    /// contains the sample.
    pub fn process_sample(&mut self, sample: GazeSample) {
        let sample_time = sample.timestamp;

        let is_new_session = match self.last_sample_time {
            Some(last_time) => sample_time - last_time > self.session_gap_threshold,
            None => true,
        };

        if is_new_session {
            self.complete_current_window();
        }

        let next_start = match &self.current_window {
            None => Some(sample_time),
            Some(window) if sample_time >= window.end => {
                let step = self.window_duration.num_milliseconds().max(1);
                let skipped = (sample_time - window.end).num_milliseconds() / step;
                // skipped * step never exceeds the distance to sample_time
                Some(
                    Duration::try_milliseconds(skipped * step)
                        .and_then(|offset| window.end.checked_add_signed(offset))
                        .unwrap_or(sample_time),
                )
            }
            Some(_) => None,
        };

        if let Some(start) = next_start {
            self.complete_current_window();
            let mut window = SampleWindow::new(start, self.window_duration);
            window.is_session_start = is_new_session;
            self.current_window = Some(window);
        }

        if let Some(ref mut window) = self.current_window {
            window.add_sample(sample);
        }

        self.last_sample_time = Some(match self.last_sample_time {
            Some(last) if last > sample_time => last,
            _ => sample_time,
        });
    }

    /// Force completion of the current window (e.g., on stop).
    pub fn flush(&mut self) {
        self.complete_current_window();
    }

    /// Get and remove completed windows.
    pub fn take_completed_windows(&mut self) -> Vec<SampleWindow> {
        std::mem::take(&mut self.completed_windows)
    }

    pub fn completed_window_count(&self) -> usize {
        self.completed_windows.len()
    }

    /// Complete the current window if `now` is past its end.
    pub fn check_window_expiry(&mut self, now: DateTime<Utc>) {
        if let Some(ref window) = self.current_window {
            if now >= window.end {
                self.complete_current_window();
            }
        }
    }

    fn complete_current_window(&mut self) {
        if let Some(window) = self.current_window.take() {
            // Only keep non-empty windows
            if !window.is_empty() {
                self.completed_windows.push(window);
            }
        }
    }
}

/// Cut a recording into overlapping windows of `length`, one every `stride`.
///
/// The first window ends `lead_in` (at least `length`) after the first
/// sample; only windows that end within the recording are produced, and
/// windows without samples are skipped.
pub fn sliding_windows(
    samples: &[GazeSample],
    length: std::time::Duration,
    stride: std::time::Duration,
    lead_in: std::time::Duration,
) -> Result<Vec<SampleWindow>, InvalidSpan> {
    let length = span("window length", length)?;
    let stride = span("stride", stride)?;
    let lead_in = Duration::from_std(lead_in).map_err(|_| InvalidSpan {
        name: "lead-in",
        value: lead_in,
    })?;

    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);

    let (origin, last) = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => return Ok(Vec::new()),
    };

    let mut end = match origin.checked_add_signed(lead_in.max(length)) {
        Some(end) => end,
        None => return Ok(Vec::new()),
    };

    let mut windows = Vec::new();
    let (mut lo, mut hi) = (0, 0);
    while end <= last {
        let start = end - length;
        while lo < sorted.len() && sorted[lo].timestamp < start {
            lo += 1;
        }
        while hi < sorted.len() && sorted[hi].timestamp < end {
            hi += 1;
        }

        if lo < hi {
            windows.push(SampleWindow {
                start,
                end,
                samples: sorted[lo..hi].to_vec(),
                is_session_start: windows.is_empty(),
            });
        }
        end = match end.checked_add_signed(stride) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn sample_at(origin: DateTime<Utc>, millis: i64) -> GazeSample {
        GazeSample::at(origin + Duration::milliseconds(millis), 0.5, 0.5)
    }

    fn manager() -> WindowManager {
        WindowManager::new(Duration::seconds(5), Duration::seconds(30))
    }

    #[test]
    fn test_window_bounds() {
        let start = Utc::now();
        let window = SampleWindow::new(start, Duration::seconds(5));

        assert_eq!(window.end, start + Duration::seconds(5));
        assert!((window.duration_secs() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_end_saturates() {
        let window = SampleWindow::new(DateTime::<Utc>::MAX_UTC, Duration::seconds(5));
        assert_eq!(window.end, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_span_rejects_unrepresentable_durations() {
        assert_eq!(span("stride", StdDuration::from_secs(1)), Ok(Duration::seconds(1)));
        assert!(span("stride", StdDuration::ZERO).is_err());
        assert!(span("stride", StdDuration::from_micros(500)).is_err());
        assert!(span("stride", StdDuration::from_secs(u64::MAX)).is_err());

        let err = span("stride", StdDuration::from_secs(10_000_000_000_000)).unwrap_err();
        assert_eq!(err.name, "stride");
    }

    #[test]
    fn test_tumbling_windows_stay_aligned() {
        let origin = Utc::now() - Duration::hours(1);
        let mut manager = manager();

        // 12 seconds at 10 Hz
        for i in 0..120 {
            manager.process_sample(sample_at(origin, i * 100));
        }
        assert_eq!(manager.completed_window_count(), 2);

        manager.flush();
        let windows = manager.take_completed_windows();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].sample_count(), 50);
        assert_eq!(windows[1].sample_count(), 50);
        assert_eq!(windows[2].sample_count(), 20);
        assert_eq!(windows[1].start, origin + Duration::seconds(5));
        assert!(windows[0].is_session_start);
        assert!(!windows[1].is_session_start);
    }

    #[test]
    fn test_skipped_windows_keep_alignment() {
        let origin = Utc::now() - Duration::hours(1);
        let mut manager = manager();

        manager.process_sample(sample_at(origin, 0));
        manager.process_sample(sample_at(origin, 12_300));
        manager.flush();

        let windows = manager.take_completed_windows();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start, origin + Duration::seconds(10));
    }

    #[test]
    fn test_gap_starts_new_series() {
        let origin = Utc::now() - Duration::hours(1);
        let mut manager = manager();

        manager.process_sample(sample_at(origin, 0));
        manager.process_sample(sample_at(origin, 61_234));
        manager.flush();

        let windows = manager.take_completed_windows();
        assert_eq!(windows.len(), 2);
        assert!(windows[1].is_session_start);
        assert_eq!(windows[1].start, origin + Duration::milliseconds(61_234));
    }

    #[test]
    fn test_expiry_closes_stale_window() {
        let origin = Utc::now() - Duration::hours(1);
        let mut manager = manager();

        manager.process_sample(sample_at(origin, 0));
        manager.check_window_expiry(origin + Duration::seconds(1));
        assert_eq!(manager.completed_window_count(), 0);

        manager.check_window_expiry(origin + Duration::seconds(5));
        assert_eq!(manager.completed_window_count(), 1);
    }

    #[test]
    fn test_sliding_windows() {
        let origin = Utc::now() - Duration::hours(1);
        // 50 seconds at 10 Hz
        let samples: Vec<GazeSample> = (0..500).map(|i| sample_at(origin, i * 100)).collect();

        let windows = sliding_windows(
            &samples,
            StdDuration::from_secs(5),
            StdDuration::from_secs(1),
            StdDuration::from_secs(20),
        )
        .unwrap();

        // Window ends at 20s, 21s, ... 49s
        assert_eq!(windows.len(), 30);
        assert_eq!(windows[0].end, origin + Duration::seconds(20));
        assert_eq!(windows[0].sample_count(), 50);
        assert!(windows[0].is_session_start);
        assert!(!windows[1].is_session_start);
    }

    #[test]
    fn test_sliding_windows_on_short_recording() {
        let origin = Utc::now();
        let samples = vec![sample_at(origin, 0), sample_at(origin, 1_000)];
        let windows = sliding_windows(
            &samples,
            StdDuration::from_secs(5),
            StdDuration::from_secs(1),
            StdDuration::ZERO,
        )
        .unwrap();
        assert!(windows.is_empty());
        assert!(sliding_windows(&[], StdDuration::from_secs(5), StdDuration::from_secs(1), StdDuration::ZERO)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sliding_windows_with_huge_stride() {
        let origin = Utc::now() - Duration::hours(1);
        let samples: Vec<GazeSample> = (0..500).map(|i| sample_at(origin, i * 100)).collect();

        // Too long to represent at all
        let err = sliding_windows(
            &samples,
            StdDuration::from_secs(5),
            StdDuration::from_secs(u64::MAX),
            StdDuration::ZERO,
        )
        .unwrap_err();
        assert_eq!(err.name, "stride");

        // Representable, but stepping past the end of time stops the cut
        let windows = sliding_windows(
            &samples,
            StdDuration::from_secs(5),
            StdDuration::from_secs(9_000_000_000_000),
            StdDuration::ZERO,
        )
        .unwrap();
        assert_eq!(windows.len(), 1);
    }
}
