//! Integration tests streaming from a simulated Ganzin Sol device

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::{SinkExt, StreamExt};
use std::net::{Ipv4Addr, TcpListener};
use std::thread;
use std::time::{Duration, Instant};
use theia_sdk::core::{CogLoadLevels, WindowKind};
use theia_sdk::device::{GanzinSource, SourceOptions};
use theia_sdk::{
    CognitiveLoadLevel, DrowsinessLevel, GanzinConfig, GazeFeatures, GazeSample, GazeSource,
    InferenceEngine, Prediction, SdkError, SessionSettings, SessionSnapshot, TheiaSdk,
};
use tokio_tungstenite::tungstenite::Message;

struct StubEngine;

impl InferenceEngine for StubEngine {
    fn cognitive_load(&mut self, _features: &GazeFeatures, at: DateTime<Utc>) -> Option<CogLoadLevels> {
        let mut levels = CogLoadLevels::new();
        levels.insert(
            "cog-load-general".to_string(),
            Prediction::new(at, CognitiveLoadLevel::Moderate, 0.5),
        );
        Some(levels)
    }

    fn drowsiness(&mut self, _features: &GazeFeatures, _at: DateTime<Utc>) -> Option<Prediction<DrowsinessLevel>> {
        None
    }
}

fn past_recording(seconds: i64) -> Vec<GazeSample> {
    let origin = Utc::now() - ChronoDuration::hours(1);
    (0..seconds * 10)
        .map(|i| GazeSample::at(origin + ChronoDuration::milliseconds(i * 100), 0.5, 0.5))
        .collect()
}

fn cog_window_sizes(snapshots: &[SessionSnapshot]) -> Vec<usize> {
    snapshots
        .iter()
        .filter(|s| s.kind == WindowKind::CognitiveLoad)
        .map(|s| s.features.sample_count)
        .collect()
}

/// Run a simulated device on its own thread. `serve` gets the listener and
/// handles as many connections as it likes.
fn run_device<F, Fut>(serve: F) -> u16
where
    F: FnOnce(tokio::net::TcpListener) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()>,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind device");
    let port = listener.local_addr().expect("No local address").port();
    listener
        .set_nonblocking(true)
        .expect("Failed to set nonblocking");

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).expect("Failed to adopt listener");
            serve(listener).await;
        });
    });

    port
}

type DeviceSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

async fn accept(listener: &tokio::net::TcpListener) -> DeviceSocket {
    let (stream, _) = listener.accept().await.expect("Failed to accept");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("WebSocket handshake failed")
}

async fn wait_for_client_to_leave(ws: &mut DeviceSocket) {
    while let Some(message) = ws.next().await {
        if message.is_err() {
            break;
        }
    }
}

fn reconnecting() -> SessionSettings {
    SessionSettings {
        source: SourceOptions {
            reconnect: true,
            connect_timeout: Duration::from_secs(2),
        },
        ..SessionSettings::default()
    }
}

fn ganzin_sdk(port: u16, settings: SessionSettings) -> TheiaSdk {
    let mut sdk = TheiaSdk::new("abc123", "Ganzin")
        .unwrap()
        .with_settings(settings)
        .with_engine(Box::new(StubEngine));
    sdk.set_ip("127.0.0.1").unwrap();
    sdk.set_port(port).unwrap();
    sdk
}

/// Poll until `expected` samples have arrived or `attempts` polls have passed.
fn poll_until_received(sdk: &mut TheiaSdk, expected: u64, attempts: usize) {
    for _ in 0..attempts {
        sdk.get_cog_load_levels();
        if sdk.session_stats().samples_received >= expected {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind")
        .local_addr()
        .expect("No local address")
        .port()
}

/// Serve one WebSocket client: send the samples as two text frames plus a
/// binary frame, then wait for the client to leave.
fn spawn_device(samples: Vec<GazeSample>) -> u16 {
    run_device(move |listener| async move {
        let mut ws = accept(&listener).await;

        let (first, rest) = samples.split_at(samples.len() / 2);
        let single = serde_json::to_string(&first[0]).expect("encode");
        let batch = serde_json::to_string(&first[1..]).expect("encode");
        let tail = serde_json::to_string(rest).expect("encode");

        ws.send(Message::text(single)).await.expect("send");
        ws.send(Message::binary(vec![0u8, 1, 2])).await.expect("send");
        ws.send(Message::text("not a sample".to_string())).await.expect("send");
        ws.send(Message::text(batch)).await.expect("send");
        ws.send(Message::text(tail)).await.expect("send");

        wait_for_client_to_leave(&mut ws).await;
    })
}

fn no_reconnect() -> SessionSettings {
    SessionSettings {
        source: SourceOptions {
            reconnect: false,
            connect_timeout: Duration::from_secs(2),
        },
        ..SessionSettings::default()
    }
}

#[test]
fn test_stream_from_device() {
    let port = spawn_device(past_recording(12));

    let mut sdk = ganzin_sdk(port, no_reconnect());
    sdk.start_new_session(None).unwrap();
    sdk.start_realtime_data().expect("Failed to connect to device");

    poll_until_received(&mut sdk, 120, 100);
    assert_eq!(sdk.log().stats().samples_received, 120);

    let update = sdk.get_cog_load_levels().expect("No cognitive load update");
    assert_eq!(update.primary().unwrap().level, CognitiveLoadLevel::Moderate);
    assert_eq!(update.batch, 2);
    assert!(sdk.get_drowsiness_level().is_none());

    let snapshots = sdk.stop_processing().unwrap();
    assert!(snapshots
        .iter()
        .filter(|s| s.kind == WindowKind::CognitiveLoad)
        .all(|s| s.cog_load.is_some()));
    assert_eq!(cog_window_sizes(&snapshots), vec![50, 50, 20]);
}

#[test]
fn test_stream_resumes_after_device_reconnects() {
    let recording = past_recording(10);
    let (before, after) = recording.split_at(30);
    let (before, after) = (before.to_vec(), after.to_vec());

    let port = run_device(move |listener| async move {
        let mut ws = accept(&listener).await;
        let frame = serde_json::to_string(&before).expect("encode");
        ws.send(Message::text(frame)).await.expect("send");
        ws.close(None).await.expect("close");
        drop(ws);

        let mut ws = accept(&listener).await;
        let frame = serde_json::to_string(&after).expect("encode");
        ws.send(Message::text(frame)).await.expect("send");
        wait_for_client_to_leave(&mut ws).await;
    });

    let mut sdk = ganzin_sdk(port, reconnecting());
    sdk.start_new_session(None).unwrap();
    sdk.start_realtime_data().expect("Failed to connect to device");

    // Covers the reconnect delay
    poll_until_received(&mut sdk, 100, 160);
    assert_eq!(sdk.session_stats().samples_received, 100);
    assert!(sdk.is_streaming());

    let snapshots = sdk.stop_processing().unwrap();
    assert_eq!(cog_window_sizes(&snapshots), vec![50, 50]);
}

#[test]
fn test_source_ends_when_device_closes_without_reconnect() {
    let samples = past_recording(2);
    let port = run_device(move |listener| async move {
        let mut ws = accept(&listener).await;
        let frame = serde_json::to_string(&samples).expect("encode");
        ws.send(Message::text(frame)).await.expect("send");
        ws.close(None).await.expect("close");
    });

    let options = SourceOptions {
        reconnect: false,
        connect_timeout: Duration::from_secs(2),
    };
    let mut source = GanzinSource::new(GanzinConfig::new(Ipv4Addr::LOCALHOST, port), options);
    source.start().expect("Failed to connect to device");

    let mut received = 0;
    while received < 20 {
        source
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .expect("sample");
        received += 1;
    }
    for _ in 0..40 {
        if !source.is_running() {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    assert!(!source.is_running());
    source.stop();
}

#[test]
fn test_stop_interrupts_reconnect_delay() {
    // The device hangs up straight away, so the source waits to reconnect
    let port = run_device(|listener| async move {
        let ws = accept(&listener).await;
        drop(ws);
        // Keep accepting so a reconnect does not fail
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });

    let mut sdk = ganzin_sdk(port, reconnecting());
    sdk.start_new_session(None).unwrap();
    sdk.start_realtime_data().expect("Failed to connect to device");
    thread::sleep(Duration::from_millis(300));

    let started = Instant::now();
    sdk.stop_processing().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_unreachable_device() {
    let port = free_port();

    let mut sdk = TheiaSdk::new("abc123", "Ganzin")
        .unwrap()
        .with_settings(no_reconnect());
    sdk.set_ip("127.0.0.1").unwrap();
    sdk.set_port(port).unwrap();
    sdk.start_new_session(None).unwrap();

    match sdk.start_realtime_data() {
        Err(SdkError::UnreachableDevice { endpoint, .. }) => {
            assert_eq!(endpoint, format!("ws://127.0.0.1:{port}"));
        }
        other => panic!("Expected UnreachableDevice, got {other:?}"),
    }
    assert!(!sdk.is_streaming());

    // Settings stay editable after a failed start
    sdk.set_port(port.wrapping_add(1).max(1)).unwrap();
}
