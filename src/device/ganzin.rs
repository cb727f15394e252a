//! Ganzin Sol backend.
//!
//! The device exposes its gaze stream as a WebSocket endpoint on its network
//! address. A dedicated thread drives a current-thread tokio runtime that
//! connects, decodes JSON text frames into [`GazeSample`]s and forwards them
//! to the sample channel. The outcome of the first connection attempt is
//! reported back to [`GanzinSource::start`] so an unreachable device fails
//! the call instead of producing an empty stream. [`GanzinSource::stop`]
//! wakes the worker wherever it is waiting.

use crate::device::types::decode_samples;
use crate::device::{forward, DeviceError, GazeSample, GazeSource, SourceOptions, CHANNEL_CAPACITY};
use crate::platform::GanzinConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Delay before reconnecting after the stream drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

type DeviceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Networked source for a Ganzin Sol device.
pub struct GanzinSource {
    config: GanzinConfig,
    options: SourceOptions,
    sender: Sender<GazeSample>,
    receiver: Receiver<GazeSample>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    dropped: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl GanzinSource {
    pub fn new(config: GanzinConfig, options: SourceOptions) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            config,
            options,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            dropped: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Ganzin stream worker panicked");
            }
        }
    }
}

impl GazeSource for GanzinSource {
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DeviceError::AlreadyRunning);
        }
        // A previous stream may have ended on its own.
        self.join_worker();
        // Discard a wakeup left over from the previous stream
        self.stop = Arc::new(Notify::new());

        let ctx = StreamContext {
            url: self.config.ws_url(),
            options: self.options.clone(),
            sender: self.sender.clone(),
            running: Arc::clone(&self.running),
            stop: Arc::clone(&self.stop),
            dropped: Arc::clone(&self.dropped),
        };
        let (ready_tx, ready_rx) = bounded::<Result<(), DeviceError>>(1);

        self.running.store(true, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("ganzin-stream".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        ctx.running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(DeviceError::Worker(e.to_string())));
                        return;
                    }
                };
                runtime.block_on(run_stream(&ctx, ready_tx));
                ctx.running.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(DeviceError::Worker(e.to_string()));
            }
        }

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.join_worker();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.join_worker();
                Err(DeviceError::Worker(
                    "stream worker exited before connecting".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!(url = %self.config.ws_url(), "Stopping Ganzin stream");
        }
        self.stop.notify_one();
        self.join_worker();
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
        format!("Ganzin Sol at {}", self.config.ws_url())
    }
}

impl Drop for GanzinSource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct StreamContext {
    url: String,
    options: SourceOptions,
    sender: Sender<GazeSample>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    dropped: Arc<AtomicU64>,
}

async fn connect(url: &str, timeout: Duration) -> Result<DeviceSocket, DeviceError> {
    let unreachable = |reason: String| DeviceError::Unreachable {
        endpoint: url.to_string(),
        reason,
    };

    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(unreachable(e.to_string())),
        Err(_) => Err(unreachable(format!(
            "no response within {}s",
            timeout.as_secs_f64()
        ))),
    }
}

async fn run_stream(ctx: &StreamContext, ready: Sender<Result<(), DeviceError>>) {
    let mut ready = Some(ready);

    while ctx.running.load(Ordering::SeqCst) {
        tracing::info!(url = %ctx.url, "Connecting to Ganzin Sol");

        let attempt = tokio::select! {
            result = connect(&ctx.url, ctx.options.connect_timeout) => result,
            _ = ctx.stop.notified() => return,
        };

        match attempt {
            Ok(mut socket) => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
                tracing::info!(url = %ctx.url, "Ganzin stream connected");

                if !pump(&mut socket, ctx).await {
                    let _ = socket.close(None).await;
                    return;
                }
            }
            Err(e) => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(e));
                    return;
                }
                tracing::warn!("Reconnect failed: {}", e);
            }
        }

        if !ctx.options.reconnect {
            tracing::info!("Ganzin stream ended, reconnect disabled");
            return;
        }

        tracing::info!("Ganzin stream dropped, reconnecting in {}s", RECONNECT_DELAY.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = ctx.stop.notified() => return,
        }
    }
}

/// Read frames until the connection ends. Returns `false` when streaming
/// should stop altogether, `true` when a reconnect may be attempted.
async fn pump(socket: &mut DeviceSocket, ctx: &StreamContext) -> bool {
    loop {
        if !ctx.running.load(Ordering::SeqCst) {
            return false;
        }

        let message = tokio::select! {
            next = socket.next() => match next {
                Some(message) => message,
                None => {
                    tracing::info!("Ganzin connection closed");
                    return true;
                }
            },
            _ = ctx.stop.notified() => return false,
        };

        match message {
            Ok(Message::Text(text)) => match decode_samples(text.as_str()) {
                Ok(samples) => {
                    for sample in samples {
                        if !forward(&ctx.sender, sample, &ctx.dropped) {
                            tracing::warn!("Sample receiver closed");
                            return false;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping undecodable Ganzin frame: {}", e);
                }
            },
            Ok(Message::Binary(data)) => {
                tracing::debug!(bytes = data.len(), "Ignoring binary Ganzin frame");
            }
            Ok(Message::Close(_)) => {
                tracing::info!("Ganzin device closed the stream");
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Ganzin stream error: {}", e);
                return true;
            }
        }
    }
}
