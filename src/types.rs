// src/types.rs
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// 电极位置 (固定四个通道)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    C3,
    C4,
    Cz,
    Oz,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 4] = [
        ChannelRole::C3,
        ChannelRole::C4,
        ChannelRole::Cz,
        ChannelRole::Oz,
    ];

    /// Row of this role inside a [`crate::drivers::SampleBlock`].
    pub fn index(self) -> usize {
        match self {
            ChannelRole::C3 => 0,
            ChannelRole::C4 => 1,
            ChannelRole::Cz => 2,
            ChannelRole::Oz => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChannelRole::C3 => "C3",
            ChannelRole::C4 => "C4",
            ChannelRole::Cz => "Cz",
            ChannelRole::Oz => "Oz",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed frequency interval `[low_hz, high_hz]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl FrequencyBand {
    pub const fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz <= self.high_hz
    }
}

// Mu 与 Alpha 使用同一频段，分别读取运动区和枕区电极
pub const MU_BAND: FrequencyBand = FrequencyBand::new(8.0, 12.0);
pub const BETA_BAND: FrequencyBand = FrequencyBand::new(13.0, 30.0);
pub const ALPHA_BAND: FrequencyBand = FrequencyBand::new(8.0, 12.0);

// 控制轴
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Yaw,
    Altitude,
    Pitch,
    Throttle,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::Yaw, Axis::Altitude, Axis::Pitch, Axis::Throttle];
}

// 控制器状态机: 只能单向 Calibrating -> Streaming
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerPhase {
    Calibrating,
    Streaming,
}

/// Resting-state reference powers, fixed for the rest of the run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Baseline {
    pub cz_total: f64,
    pub cz_mu: f64,
    pub cz_beta: f64,
    pub oz_alpha: f64,
}

impl Baseline {
    /// Placeholder used when calibration collected nothing. Not a real baseline.
    pub const PLACEHOLDER: Baseline = Baseline {
        cz_total: 1.0,
        cz_mu: 1.0,
        cz_beta: 1.0,
        oz_alpha: 1.0,
    };
}

/// Four-axis joystick command emitted once per successful hop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Command {
    pub yaw: f64,
    pub altitude: f64,
    pub pitch: f64,
    pub throttle: f64,
    /// `(throttle + 1) / 2`, kept for consumers that only read speed.
    pub speed: f64,
    /// Seconds since the unix epoch.
    #[serde(rename = "ts")]
    pub timestamp: f64,
}

impl Command {
    pub fn new(yaw: f64, altitude: f64, pitch: f64, throttle: f64) -> Self {
        Self {
            yaw,
            altitude,
            pitch,
            throttle,
            speed: (throttle + 1.0) * 0.5,
            timestamp: unix_now_secs(),
        }
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Yaw => self.yaw,
            Axis::Altitude => self.altitude,
            Axis::Pitch => self.pitch,
            Axis::Throttle => self.throttle,
        }
    }
}

pub fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
