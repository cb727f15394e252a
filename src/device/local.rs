//! Pupil Labs Neon backend.
//!
//! The Neon needs no network configuration: samples arrive on a locally
//! attached capture path as newline-delimited JSON (a recording file, a FIFO
//! fed by the companion bridge, or standard input).
//!
//! A regular file is read no faster than the caller drains it, so every
//! sample arrives. FIFOs and standard input carry live data and drop
//! samples when the channel is full.

use crate::device::types::decode_samples;
use crate::device::{forward, DeviceError, GazeSample, GazeSource, CHANNEL_CAPACITY};
use crate::platform::LocalCaptureConfig;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long a file reader waits for channel room before rechecking `stop`.
const SEND_RETRY: Duration = Duration::from_millis(100);

/// What the reader does when the channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Wait for room (recorded files)
    Wait,
    /// Drop and count the sample (live input)
    DropWhenFull,
}

/// Local capture source for a Pupil Labs Neon.
pub struct LocalCaptureSource {
    config: LocalCaptureConfig,
    sender: Sender<GazeSample>,
    receiver: Receiver<GazeSample>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl LocalCaptureSource {
    pub fn new(config: LocalCaptureConfig) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    fn open_input(&self) -> Result<(Box<dyn Read + Send>, Delivery), DeviceError> {
        let Some(path) = &self.config.capture_path else {
            return Ok((Box::new(std::io::stdin()), Delivery::DropWhenFull));
        };
        let unavailable = |e: std::io::Error| {
            DeviceError::CaptureUnavailable(format!("{}: {e}", path.display()))
        };

        let file = File::open(path).map_err(unavailable)?;
        let delivery = if file.metadata().map_err(unavailable)?.is_file() {
            Delivery::Wait
        } else {
            Delivery::DropWhenFull
        };
        Ok((Box::new(file), delivery))
    }
}

impl GazeSource for LocalCaptureSource {
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DeviceError::AlreadyRunning);
        }

        let (input, delivery) = self.open_input()?;
        let sender = self.sender.clone();
        let running = Arc::clone(&self.running);
        let dropped = Arc::clone(&self.dropped);

        self.running.store(true, Ordering::SeqCst);
        let handle = std::thread::Builder::new()
            .name("neon-capture".to_string())
            .spawn(move || {
                read_samples(BufReader::new(input), delivery, &sender, &running, &dropped);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                DeviceError::Worker(e.to_string())
            })?;

        self.worker = Some(handle);
        tracing::info!("{} started", self.describe());
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // A reader blocked on stdin cannot be interrupted, so only join a
        // worker that has already finished.
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> &Receiver<GazeSample> {
        &self.receiver
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn describe(&self) -> String {
        match &self.config.capture_path {
            Some(path) => format!("Pupil Labs Neon capture from {}", path.display()),
            None => "Pupil Labs Neon capture from stdin".to_string(),
        }
    }
}

fn read_samples<R: BufRead>(
    reader: R,
    delivery: Delivery,
    sender: &Sender<GazeSample>,
    running: &AtomicBool,
    dropped: &AtomicU64,
) {
    for (line_no, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            return;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Capture read error: {}", e);
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match decode_samples(line) {
            Ok(samples) => {
                for sample in samples {
                    let delivered = match delivery {
                        Delivery::Wait => send_waiting(sender, sample, running),
                        Delivery::DropWhenFull => forward(sender, sample, dropped),
                    };
                    if !delivered {
                        return;
                    }
                }
            }
            Err(e) => tracing::warn!(line = line_no + 1, "Skipping malformed capture line: {}", e),
        }
    }
    tracing::info!("Capture input ended");
}

/// Block until the sample is queued. Returns `false` on stop or disconnect.
fn send_waiting(sender: &Sender<GazeSample>, mut sample: GazeSample, running: &AtomicBool) -> bool {
    loop {
        match sender.send_timeout(sample, SEND_RETRY) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if !running.load(Ordering::SeqCst) {
                    return false;
                }
                sample = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
