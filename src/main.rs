//! Theia CLI
//!
//! License-gated eye-tracking analysis from the command line.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use theia_sdk::{
    config::{parse_timezone, Config},
    core::{compute_features_in, sliding_windows, SessionSnapshot},
    device::{load_recording, SceneCamera},
    host_info,
    platform::{GanzinConfig, PlatformConfig},
    session::SessionLog,
    SdkError, TheiaSdk, LICENSE_NOTICE, VERSION,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "theia")]
#[command(author = "HarmonEyes")]
#[command(version = VERSION)]
#[command(about = "License-gated eye-tracking analysis", long_about = None)]
struct Cli {
    /// License key (overrides THEIA_LICENSE_KEY and the config file)
    #[arg(long, global = true)]
    license_key: Option<String>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream from the configured device and poll predictions once a second
    Stream {
        /// Platform to use (PL or Ganzin); defaults to the configured one
        #[arg(long)]
        platform: Option<String>,

        /// Ganzin Sol IP address
        #[arg(long)]
        ip: Option<String>,

        /// Ganzin Sol port
        #[arg(long)]
        port: Option<u16>,

        /// Pupil Labs Neon capture file (NDJSON); stdin when omitted
        #[arg(long)]
        capture: Option<PathBuf>,

        /// Stop after this many seconds (runs until Ctrl+C when omitted)
        #[arg(long)]
        duration: Option<u64>,

        /// Session id to use instead of a fresh one
        #[arg(long)]
        session: Option<Uuid>,

        /// Export format for session snapshots
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Output file for session snapshots
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Run offline prediction over an NDJSON or CSV recording
    #[command(alias = "replay")]
    Batch {
        /// NDJSON recording, or a CSV file such as a Pupil Cloud
        /// gaze_and_eye_state.csv export
        input: PathBuf,

        /// Scene camera width in pixels (CSV gaze in pixels)
        #[arg(long, default_value = "1600")]
        scene_width: f64,

        /// Scene camera height in pixels (CSV gaze in pixels)
        #[arg(long, default_value = "1200")]
        scene_height: f64,

        /// What to predict
        #[arg(long, value_enum, default_value = "cog-load")]
        kind: BatchKind,

        /// IANA timezone for the time-of-day feature (drowsiness)
        #[arg(long)]
        timezone: Option<String>,

        /// Seconds between drowsiness predictions
        #[arg(long, default_value = "120")]
        stride: u64,

        /// Output file (JSON Lines); stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show or change configuration
    Config {
        /// Platform to use (PL or Ganzin)
        #[arg(long)]
        platform: Option<String>,

        /// Ganzin Sol IP address
        #[arg(long)]
        ip: Option<String>,

        /// Ganzin Sol port
        #[arg(long)]
        port: Option<u16>,

        /// Pupil Labs Neon capture file
        #[arg(long)]
        capture: Option<PathBuf>,

        /// IANA timezone for the time-of-day feature
        #[arg(long)]
        timezone: Option<String>,

        /// Store this license key in the config file
        #[arg(long = "set-license-key")]
        set_license_key: Option<String>,
    },

    /// Show host, device and cumulative session statistics
    Status,

    /// Display the licensing notice
    License,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Jsonl,
}

#[derive(Clone, Copy, ValueEnum)]
enum BatchKind {
    CogLoad,
    Drowsiness,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("theia_sdk={default_level}"))),
        )
        .with_writer(std::io::stderr)
        .init();

    let license_key = cli.license_key.as_deref();

    match cli.command {
        Commands::Stream {
            platform,
            ip,
            port,
            capture,
            duration,
            session,
            format,
            output,
        } => {
            let overrides = DeviceOverrides {
                platform,
                ip,
                port,
                capture,
            };
            cmd_stream(license_key, overrides, duration, session, format, output)
        }
        Commands::Batch {
            input,
            scene_width,
            scene_height,
            kind,
            timezone,
            stride,
            output,
        } => {
            let camera = SceneCamera {
                width: scene_width,
                height: scene_height,
            };
            cmd_batch(license_key, &input, camera, kind, timezone, stride, output)
        }
        Commands::Config {
            platform,
            ip,
            port,
            capture,
            timezone,
            set_license_key,
        } => {
            let overrides = DeviceOverrides {
                platform,
                ip,
                port,
                capture,
            };
            cmd_config(overrides, timezone, set_license_key)
        }
        Commands::Status => cmd_status(),
        Commands::License => {
            println!("{LICENSE_NOTICE}");
            Ok(())
        }
    }
}

/// Device settings given on the command line.
struct DeviceOverrides {
    platform: Option<String>,
    ip: Option<String>,
    port: Option<u16>,
    capture: Option<PathBuf>,
}

impl DeviceOverrides {
    fn is_empty(&self) -> bool {
        self.platform.is_none() && self.ip.is_none() && self.port.is_none() && self.capture.is_none()
    }

    /// Apply the overrides to `device`, switching platform first.
    fn apply(&self, device: &mut PlatformConfig) -> Result<(), SdkError> {
        if let Some(ref tag) = self.platform {
            device.switch_platform(tag.parse()?);
        }
        if let Some(ref ip) = self.ip {
            device.set_ip(ip)?;
        }
        if let Some(port) = self.port {
            device.set_port(port)?;
        }
        if let Some(ref capture) = self.capture {
            device.set_capture_path(Some(capture.clone()))?;
        }
        Ok(())
    }
}

fn cmd_stream(
    license_key: Option<&str>,
    overrides: DeviceOverrides,
    duration: Option<u64>,
    session: Option<Uuid>,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Theia SDK v{VERSION}");
    println!();

    let mut config = Config::load().context("loading configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    overrides.apply(&mut config.device)?;

    let mut sdk = TheiaSdk::from_config(&config, license_key)?;

    println!("Device: {}", sdk.connection().describe());
    println!(
        "Windows: cognitive load {}s, drowsiness {}s",
        config.cog_load_window.as_secs(),
        config.drowsiness_window.as_secs()
    );
    if !sdk.has_engine() {
        println!("No inference engine installed: reporting window features only");
    }

    let session_id = sdk.start_new_session(session)?;
    println!("Session ID: {session_id}");

    sdk.start_realtime_data()?;

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")?;

    let started = Instant::now();
    let mut last_cog_batch = 0;
    let mut last_drowsy_batch = 0;

    while running.load(Ordering::SeqCst) {
        if let Some(limit) = duration {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }

        thread::sleep(Duration::from_secs(1));

        if let Some(update) = sdk.get_cog_load_levels() {
            if update.batch != last_cog_batch {
                last_cog_batch = update.batch;
                if let Some(primary) = update.primary() {
                    println!(
                        "[{}] Cognitive load (batch {}): {} ({:.2})",
                        Utc::now().format("%H:%M:%S"),
                        update.batch,
                        primary.level,
                        primary.confidence
                    );
                }
            }
        } else if let Some(features) = sdk.latest_features() {
            println!(
                "[{}] Window: {} samples, {:.1} blinks/min, closure {:.0}%",
                Utc::now().format("%H:%M:%S"),
                features.sample_count,
                features.blink_rate_per_min,
                features.eye_closure_ratio * 100.0
            );
        }

        if let Some(update) = sdk.get_drowsiness_level() {
            if update.batch != last_drowsy_batch {
                last_drowsy_batch = update.batch;
                println!(
                    "[{}] Drowsiness (batch {}): {}",
                    Utc::now().format("%H:%M:%S"),
                    update.batch,
                    update.prediction.level
                );
            }
        }
    }

    println!();
    println!("Stopping stream...");
    let snapshots = sdk.stop_processing()?;

    if !snapshots.is_empty() {
        let path = output.unwrap_or_else(|| {
            let extension = match format {
                ExportFormat::Json => "json",
                ExportFormat::Jsonl => "jsonl",
            };
            config.export_path.join(format!(
                "session_{}.{extension}",
                Utc::now().format("%Y%m%d_%H%M%S")
            ))
        });

        match export_snapshots(&snapshots, &path, format) {
            Ok(()) => {
                println!("Exported {} snapshots to {:?}", snapshots.len(), path);
                sdk.log().record_snapshots_exported(snapshots.len() as u64);
                if let Err(e) = sdk.log().save() {
                    eprintln!("Warning: Could not save session stats: {e}");
                }
            }
            Err(e) => eprintln!("Error exporting snapshots: {e:#}"),
        }
    }

    println!();
    println!("{}", sdk.log().session_summary());
    Ok(())
}

fn export_snapshots(
    snapshots: &[SessionSnapshot],
    path: &Path,
    format: ExportFormat,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = match format {
        ExportFormat::Json => serde_json::to_string_pretty(snapshots)?,
        ExportFormat::Jsonl => {
            let lines = snapshots
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()?;
            lines.join("\n")
        }
    };

    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn cmd_batch(
    license_key: Option<&str>,
    input: &Path,
    camera: SceneCamera,
    kind: BatchKind,
    timezone: Option<String>,
    stride: u64,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    let mut sdk = TheiaSdk::from_config(&config, license_key)?;

    let samples = load_recording(input, &camera)
        .with_context(|| format!("reading {}", input.display()))?;
    if samples.is_empty() {
        bail!("{} contains no gaze samples", input.display());
    }
    eprintln!("Loaded {} samples from {}", samples.len(), input.display());

    let tz = match timezone {
        Some(ref name) => parse_timezone(name)?,
        None => config.tz()?,
    };
    let settings = sdk.settings().pipeline.clone();

    let predicted = match kind {
        BatchKind::CogLoad => sdk
            .predict_cog_load_batch(&samples)
            .map(|results| to_lines(&results)),
        BatchKind::Drowsiness => sdk
            .predict_drowsiness_batch(&samples, tz, Duration::from_secs(stride))
            .map(|results| to_lines(&results)),
    };

    let lines = match predicted {
        Ok(lines) => lines?,
        Err(SdkError::NoInferenceEngine) => {
            eprintln!("No inference engine installed: writing window features instead");
            let (length, step, lead_in) = match kind {
                BatchKind::CogLoad => (
                    settings.cog_load_window,
                    Duration::from_secs(1),
                    settings.cog_load_warmup,
                ),
                BatchKind::Drowsiness => (
                    settings.drowsiness_window,
                    Duration::from_secs(stride),
                    settings.drowsiness_window,
                ),
            };
            let features: Vec<_> = sliding_windows(&samples, length, step, lead_in)
                .context("cutting recording into windows")?
                .iter()
                .map(|window| compute_features_in(window, tz))
                .collect();
            to_lines(&features)?
        }
        Err(e) => return Err(e.into()),
    };

    match output {
        Some(path) => {
            std::fs::write(&path, lines.join("\n"))
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote {} results to {:?}", lines.len(), path);
        }
        None => {
            for line in lines {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn to_lines<T: serde::Serialize>(items: &[T]) -> anyhow::Result<Vec<String>> {
    Ok(items
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?)
}

fn cmd_config(
    overrides: DeviceOverrides,
    timezone: Option<String>,
    set_license_key: Option<String>,
) -> anyhow::Result<()> {
    let mut config = Config::load().context("loading configuration")?;

    let changed = !overrides.is_empty() || timezone.is_some() || set_license_key.is_some();
    if changed {
        overrides.apply(&mut config.device)?;
        if let Some(name) = timezone {
            parse_timezone(&name)?;
            config.timezone = name;
        }
        if let Some(key) = set_license_key {
            let key = theia_sdk::LicenseKey::parse(&key)?;
            config.license_key = Some(key.expose().to_string());
        }
        config.save()?;
        println!("Configuration saved to {:?}", Config::config_path());
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!("Device: {}", config.device.describe());
    println!();

    // Never print the stored key itself
    let mut shown = config.clone();
    if let Some(ref key) = shown.license_key {
        shown.license_key = Some(
            theia_sdk::LicenseKey::parse(key)
                .map(|k| k.redacted())
                .unwrap_or_else(|_| "<invalid>".to_string()),
        );
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    let host = host_info();

    println!("Theia SDK Status");
    println!("================");
    println!();
    println!("Version: {VERSION}");
    println!(
        "Host: {} ({}/{})",
        host.hostname.as_deref().unwrap_or("unknown"),
        host.os,
        host.arch
    );
    println!();

    println!("Configuration:");
    println!("  Device: {}", config.device.describe());
    if let Some(GanzinConfig { ip, port }) = config.device.ganzin() {
        println!("  Endpoint: {ip}:{port}");
    }
    println!(
        "  License key: {}",
        if config.license_key.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    println!("  Timezone: {}", config.timezone);
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let log = SessionLog::with_persistence(stats_path);
        println!("{}", log.summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}
