// src/main.rs
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use bci_flystick::clock::SystemClock;
use bci_flystick::config::{fanout_from_env, Profile};
use bci_flystick::drivers::{AcquisitionSource, FlystickError, SyntheticSource, Timebase};
use bci_flystick::engine::{self, ControlMapper, StopSignal};
use bci_flystick::openbci::OpenBciSession;
use bci_flystick::transport::{CommandSink, LogSink, UdpCommandSink};

// 模拟源保留的历史长度 (秒)
const MOCK_HISTORY_SEC: f64 = 10.0;
const MOCK_NOISE_UV: f64 = 2.0;

/// EEG band power -> joystick axes over UDP.
#[derive(Parser, Debug)]
#[command(name = "bci-flystick", version, about)]
struct Cli {
    /// JSON profile; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Use the synthetic signal generator instead of a board
    #[arg(long)]
    mock: bool,
    #[arg(long)]
    udp_host: Option<String>,
    #[arg(long)]
    udp_port: Option<u16>,
    /// Stop after this many commands
    #[arg(long)]
    hops: Option<u64>,
    /// Override the calibration duration in seconds
    #[arg(long)]
    calibration_sec: Option<f64>,
    /// Log commands instead of sending them
    #[arg(long)]
    dry_run: bool,
}

fn load_profile(cli: &Cli) -> Result<Profile> {
    let mut profile = match &cli.config {
        Some(path) => Profile::load(path)
            .with_context(|| format!("loading profile {}", path.display()))?,
        None => Profile::default(),
    };
    if let Some(host) = &cli.udp_host {
        profile.udp.host = host.clone();
    }
    if let Some(port) = cli.udp_port {
        profile.udp.port = port;
    }
    if let Some(secs) = cli.calibration_sec {
        profile.settings.calibration_sec = secs;
    }
    profile.mock_mode |= cli.mock;
    profile.udp.fanout.extend(fanout_from_env());
    profile.validate().context("invalid profile")?;
    Ok(profile)
}

fn drive<S: AcquisitionSource>(
    mut source: S,
    profile: &Profile,
    cli: &Cli,
    stop: &StopSignal,
) -> Result<()> {
    let fs = source.sample_rate_hz();
    info!("channel rows {:?}", source.channel_layout());
    if let Some(expected) = profile.settings.sample_rate {
        if (expected - fs).abs() > f64::EPSILON {
            warn!("profile expects {expected} Hz but source reports {fs} Hz, using {fs} Hz");
        }
    }
    let mut mapper = ControlMapper::new(&profile.settings, fs)?.with_stop_signal(stop.clone());
    let mut sink: Box<dyn CommandSink> = if cli.dry_run {
        Box::new(LogSink)
    } else {
        Box::new(UdpCommandSink::new(&profile.udp.primary(), &profile.udp.fanout)?)
    };
    let mut clock = SystemClock::new();
    let report = match mapper.calibrate(&mut source, &mut clock) {
        Ok(report) => report,
        Err(FlystickError::Interrupted) => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    info!(
        "calibration done: {} windows used, {} skipped",
        report.accepted_windows, report.skipped_windows
    );
    engine::run(&mut mapper, &mut source, sink.as_mut(), &mut clock, cli.hops)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let profile = load_profile(&cli)?;

    // Ctrl+C 只设置标志，让循环正常返回，硬件会话在 Drop 中释放
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.request()).context("installing Ctrl+C handler")?;

    if profile.mock_mode {
        let fs = profile.settings.sample_rate.unwrap_or(250.0);
        info!("mock mode: synthetic source at {fs} Hz");
        let history = (profile.settings.window_sec * 2.0).max(MOCK_HISTORY_SEC);
        let source = SyntheticSource::resting(fs, history, Timebase::WallClock)?
            .with_noise(MOCK_NOISE_UV, rand::random());
        drive(source, &profile, &cli, &stop)
    } else {
        let session = OpenBciSession::connect(&profile.board)
            .with_context(|| format!("connecting to board on {}", profile.board.serial_port))?;
        drive(session, &profile, &cli, &stop)
    }
}
