//! In-memory source replaying previously captured samples.

use crate::device::{DeviceError, GazeSample, GazeSource};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Replays a fixed set of samples once, in order, when started.
pub struct ReplaySource {
    samples: Vec<GazeSample>,
    sender: Sender<GazeSample>,
    receiver: Receiver<GazeSample>,
    running: bool,
}

impl ReplaySource {
    pub fn new(samples: Vec<GazeSample>) -> Self {
        let (sender, receiver) = bounded(samples.len().max(1));
        Self {
            samples,
            sender,
            receiver,
            running: false,
        }
    }
}

impl GazeSource for ReplaySource {
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.running {
            return Err(DeviceError::AlreadyRunning);
        }
        for sample in self.samples.drain(..) {
            // The channel is sized to hold every sample.
            if self.sender.try_send(sample).is_err() {
                break;
            }
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn receiver(&self) -> &Receiver<GazeSample> {
        &self.receiver
    }

    fn dropped(&self) -> u64 {
        0
    }

    fn describe(&self) -> String {
        "replay".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_delivers_all_samples() {
        let samples: Vec<GazeSample> = (0..5).map(|i| GazeSample::new(i as f64 / 10.0, 0.5)).collect();
        let mut source = ReplaySource::new(samples);

        source.start().unwrap();
        assert!(source.is_running());
        assert_eq!(source.receiver().try_iter().count(), 5);

        assert!(matches!(source.start(), Err(DeviceError::AlreadyRunning)));
        source.stop();
        assert!(!source.is_running());
    }
}
