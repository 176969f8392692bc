// src/engine.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::brain_utils::{apply_dead_band, clamp_unit, Ewma};
use crate::calibration::{BaselineCalibrator, CalibrationReport};
use crate::clock::Clock;
use crate::config::{Gains, Settings};
use crate::drivers::{AcquisitionSource, BandPowers, FeaturePipeline, FilterPipeline, FlystickError, SampleBlock};
use crate::transport::CommandSink;
use crate::types::{Axis, Baseline, Command, ControllerPhase};

/// 防止除零
pub const EPSILON: f64 = 1e-9;

// 连续跳过这么多次就提示一次
const SKIP_WARN_EVERY: u64 = 20;

/// Shared stop request, set from a signal handler and polled once per hop.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raw (pre-gain) axis features of one window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisFeatures {
    pub yaw: f64,
    pub altitude: f64,
    pub pitch: f64,
    pub throttle: f64,
}

impl AxisFeatures {
    pub fn compute(powers: &BandPowers, baseline: &Baseline) -> Self {
        let c3 = powers.c3_motor();
        let c4 = powers.c4_motor();
        let yaw = (c4 - c3) / (c4 + c3 + EPSILON);
        let altitude = (baseline.cz_total - powers.cz_total()) / (baseline.cz_total + EPSILON);
        let pitch = (powers.cz_beta - baseline.cz_beta) / (baseline.cz_beta + EPSILON)
            - (powers.cz_mu - baseline.cz_mu) / (baseline.cz_mu + EPSILON);
        let throttle = (baseline.oz_alpha - powers.oz_alpha) / (baseline.oz_alpha + EPSILON);
        Self {
            yaw,
            altitude,
            pitch,
            throttle,
        }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Yaw => self.yaw,
            Axis::Altitude => self.altitude,
            Axis::Pitch => self.pitch,
            Axis::Throttle => self.throttle,
        }
    }

    pub fn is_finite(&self) -> bool {
        Axis::ALL.iter().all(|&axis| self.get(axis).is_finite())
    }
}

/// Owns the baseline and the per-axis smoothers; turns windows into commands.
///
/// Starts in [`ControllerPhase::Calibrating`] and moves to
/// [`ControllerPhase::Streaming`] exactly once.
pub struct ControlMapper {
    phase: ControllerPhase,
    features: FeaturePipeline,
    baseline: Option<Baseline>,
    smoothers: [Ewma; 4], // Axis::ALL 顺序
    gains: Gains,
    dead_band: f64,
    throttle_scale: f64,
    invert_pitch: bool,
    hop: Duration,
    calibration: Duration,
    calibration_poll: Duration,
    stop: StopSignal,
}

impl ControlMapper {
    pub fn new(settings: &Settings, sample_rate_hz: f64) -> Result<Self, FlystickError> {
        if !(sample_rate_hz > 0.0) {
            return Err(FlystickError::InvalidSampleRate);
        }
        settings.validate()?;
        let window_samples = settings.window_samples(sample_rate_hz);
        if window_samples == 0 {
            return Err(FlystickError::invalid(
                "window_sec",
                format!("window is shorter than one sample at {sample_rate_hz} Hz"),
            ));
        }
        let filters = FilterPipeline::new(sample_rate_hz, settings.notch, settings.bandpass);
        let alpha = settings.ewma_alpha;
        Ok(Self {
            phase: ControllerPhase::Calibrating,
            features: FeaturePipeline::new(filters, sample_rate_hz, window_samples),
            baseline: None,
            smoothers: [Ewma::new(alpha), Ewma::new(alpha), Ewma::new(alpha), Ewma::new(alpha)],
            gains: settings.gains,
            dead_band: settings.dead_band,
            throttle_scale: settings.throttle_scale,
            invert_pitch: settings.invert_pitch,
            hop: settings.hop(),
            calibration: settings.calibration(),
            calibration_poll: settings.calibration_poll(),
            stop: StopSignal::new(),
        })
    }

    /// Lets `calibrate` and [`run`] return early once `stop` is requested.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn window_samples(&self) -> usize {
        self.features.window_samples()
    }

    pub fn hop(&self) -> Duration {
        self.hop
    }

    /// Polls `source` for the configured calibration time and fixes the baseline.
    ///
    /// A stop request aborts with [`FlystickError::Interrupted`] and the mapper
    /// stays in [`ControllerPhase::Calibrating`].
    pub fn calibrate<S, C>(&mut self, source: &mut S, clock: &mut C) -> Result<CalibrationReport, FlystickError>
    where
        S: AcquisitionSource + ?Sized,
        C: Clock + ?Sized,
    {
        self.expect_phase(ControllerPhase::Calibrating)?;
        let mut calibrator = BaselineCalibrator::new();
        let window = self.window_samples();
        let started = clock.elapsed();
        info!(
            "calibrating for {:.1}s, keep still and relaxed",
            self.calibration.as_secs_f64()
        );
        while clock.elapsed().saturating_sub(started) < self.calibration {
            if self.stop.is_requested() {
                warn!("calibration interrupted");
                return Err(FlystickError::Interrupted);
            }
            clock.sleep(self.calibration_poll);
            let block = match source.get_window(window) {
                Ok(block) => block,
                Err(err) => {
                    warn!("calibration read failed: {err:#}");
                    calibrator.skip();
                    continue;
                }
            };
            match self.features.extract(&block) {
                Ok(powers) => calibrator.push(&powers),
                Err(FlystickError::InsufficientData {
                    required,
                    available,
                }) => {
                    debug!("calibration window short ({available}/{required})");
                    calibrator.skip();
                }
                Err(err) => {
                    warn!("calibration window rejected: {err}");
                    calibrator.skip();
                }
            }
            debug!(
                "calibration {:.1}s: {} accepted, {} skipped",
                clock.elapsed().saturating_sub(started).as_secs_f64(),
                calibrator.accepted(),
                calibrator.skipped()
            );
        }
        let report = calibrator.finish();
        self.finish_calibration(report.baseline)?;
        Ok(report)
    }

    /// Explicit end of calibration. The baseline is frozen from here on.
    pub fn finish_calibration(&mut self, baseline: Baseline) -> Result<(), FlystickError> {
        self.expect_phase(ControllerPhase::Calibrating)?;
        info!(
            "baseline: Cz total {:.4}, Cz mu {:.4}, Cz beta {:.4}, Oz alpha {:.4}",
            baseline.cz_total, baseline.cz_mu, baseline.cz_beta, baseline.oz_alpha
        );
        self.baseline = Some(baseline);
        self.phase = ControllerPhase::Streaming;
        Ok(())
    }

    /// One hop. `None` means nothing is emitted and no smoother state changed.
    pub fn step(&mut self, block: &SampleBlock) -> Option<Command> {
        let baseline = match (self.phase, self.baseline) {
            (ControllerPhase::Streaming, Some(baseline)) => baseline,
            _ => {
                debug!("step ignored while calibrating");
                return None;
            }
        };
        let powers = match self.features.extract(block) {
            Ok(powers) => powers,
            Err(err) => {
                debug!("hop skipped: {err}");
                return None;
            }
        };
        if !powers.is_finite() {
            warn!("hop skipped: non-finite band power {powers:?}");
            return None;
        }
        let raw = AxisFeatures::compute(&powers, &baseline);
        if !raw.is_finite() {
            warn!("hop skipped: non-finite features {raw:?}");
            return None;
        }
        let yaw = self.shape(Axis::Yaw, raw.yaw);
        let altitude = self.shape(Axis::Altitude, raw.altitude);
        let pitch = self.shape(Axis::Pitch, raw.pitch);
        let throttle = self.shape(Axis::Throttle, raw.throttle);
        Some(Command::new(yaw, altitude, pitch, throttle))
    }

    // gain -> EWMA -> scale/invert -> clamp -> dead-band
    fn shape(&mut self, axis: Axis, raw: f64) -> f64 {
        let gained = (self.gains.get(axis) * raw).clamp(-f64::MAX, f64::MAX);
        let smoothed = self.smoothers[axis_slot(axis)].step(gained);
        let adjusted = match axis {
            Axis::Throttle => smoothed * self.throttle_scale,
            Axis::Pitch if self.invert_pitch => -smoothed,
            _ => smoothed,
        };
        apply_dead_band(clamp_unit(adjusted), self.dead_band)
    }

    fn expect_phase(&self, expected: ControllerPhase) -> Result<(), FlystickError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(FlystickError::WrongPhase {
                expected,
                actual: self.phase,
            })
        }
    }
}

fn axis_slot(axis: Axis) -> usize {
    match axis {
        Axis::Yaw => 0,
        Axis::Altitude => 1,
        Axis::Pitch => 2,
        Axis::Throttle => 3,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub emitted: u64,
    pub skipped: u64,
    pub send_failures: u64,
}

/// Streaming loop: sleep half a hop, pull a window, map it, hand it to the sink.
///
/// Runs until `max_commands` commands were produced (forever when `None`) or
/// the mapper's stop signal is requested. A hop in flight when the stop
/// arrives is dropped without emitting. Read and send failures are logged and
/// the hop is dropped.
pub fn run<S, C>(
    mapper: &mut ControlMapper,
    source: &mut S,
    sink: &mut dyn CommandSink,
    clock: &mut C,
    max_commands: Option<u64>,
) -> Result<RunStats, FlystickError>
where
    S: AcquisitionSource + ?Sized,
    C: Clock + ?Sized,
{
    mapper.expect_phase(ControllerPhase::Streaming)?;
    let pause = mapper.hop().mul_f64(0.5);
    let window = mapper.window_samples();
    let mut stats = RunStats::default();
    let mut consecutive_skips = 0u64;
    info!("streaming started (window {window} samples, pause {:?})", pause);
    loop {
        if max_commands.map_or(false, |max| stats.emitted >= max) || mapper.stop.is_requested() {
            break;
        }
        clock.sleep(pause);
        let read = source.get_window(window);
        if mapper.stop.is_requested() {
            debug!("stop requested, hop abandoned");
            break;
        }
        let command = match read {
            Ok(block) => mapper.step(&block),
            Err(err) => {
                warn!("acquisition read failed: {err:#}");
                None
            }
        };
        let Some(command) = command else {
            stats.skipped += 1;
            consecutive_skips += 1;
            if consecutive_skips % SKIP_WARN_EVERY == 0 {
                warn!("no usable window for {consecutive_skips} hops");
            }
            continue;
        };
        consecutive_skips = 0;
        stats.emitted += 1;
        if let Err(err) = sink.send(&command) {
            stats.send_failures += 1;
            warn!("command dropped: {err}");
        }
    }
    info!(
        "streaming stopped: {} emitted, {} skipped, {} send failures",
        stats.emitted, stats.skipped, stats.send_failures
    );
    Ok(stats)
}
