// src/config.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::{ChannelLayout, FlystickError};
use crate::types::{Axis, ChannelRole};

/// 额外 UDP 目标的环境变量 (逗号分隔的 host:port)
pub const UDP_FANOUT_ENV: &str = "BCI_FLYSTICK_UDP_FANOUT";

// 整个配置文件 (JSON)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub board: BoardConfig,
    pub settings: Settings,
    pub udp: UdpConfig,
    /// Use the synthetic generator instead of a board.
    pub mock_mode: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub serial_port: String,
    /// Alias (`cyton`, `ganglion`, `cyton_daisy`, `synthetic`) or a raw numeric id.
    pub board_id: String,
    /// Channel role -> index into the board's EEG channel list.
    pub channels: BTreeMap<String, usize>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        let channels = ChannelRole::ALL
            .iter()
            .map(|role| (role.label().to_string(), role.index()))
            .collect();
        Self {
            serial_port: "COM3".to_string(),
            board_id: "cyton".to_string(),
            channels,
        }
    }
}

impl BoardConfig {
    pub fn layout(&self) -> Result<ChannelLayout, FlystickError> {
        ChannelLayout::from_map(&self.channels)
    }

    pub fn resolve_board_id(&self) -> Result<i32, FlystickError> {
        resolve_board_id(&self.board_id)
    }
}

pub fn resolve_board_id(alias: &str) -> Result<i32, FlystickError> {
    let trimmed = alias.trim();
    // 原始数字 id 先解析，负数 (synthetic / streaming / playback) 也要支持
    if let Ok(id) = trimmed.parse::<i32>() {
        return Ok(id);
    }
    match trimmed.to_ascii_lowercase().replace('-', "_").as_str() {
        "synthetic" => Ok(-1),
        "cyton" => Ok(0),
        "ganglion" => Ok(1),
        "cyton_daisy" => Ok(2),
        _ => Err(FlystickError::invalid(
            "board.board_id",
            format!("unknown board `{alias}`"),
        )),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gains {
    pub yaw: f64,
    pub altitude: f64,
    pub pitch: f64,
    #[serde(alias = "speed")]
    pub throttle: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            yaw: 1.0,
            altitude: 1.0,
            pitch: 1.0,
            throttle: 1.0,
        }
    }
}

impl Gains {
    pub fn uniform(gain: f64) -> Self {
        Self {
            yaw: gain,
            altitude: gain,
            pitch: gain,
            throttle: gain,
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
}

// 信号处理与控制参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Expected board rate; the board's reported rate wins if they differ.
    pub sample_rate: Option<f64>,
    /// Mains notch in Hz, `null` disables it.
    pub notch: Option<f64>,
    /// Bandpass edges in Hz, `null` disables it.
    pub bandpass: Option<(f64, f64)>,
    pub window_sec: f64,
    pub hop_sec: f64,
    pub ewma_alpha: f64,
    pub dead_band: f64,
    pub gains: Gains,
    pub throttle_scale: f64,
    pub invert_pitch: bool,
    pub calibration_sec: f64,
    pub calibration_poll_sec: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: Some(250.0),
            notch: Some(50.0),
            bandpass: Some((1.0, 40.0)),
            window_sec: 1.0,
            hop_sec: 0.5,
            ewma_alpha: 0.3,
            dead_band: 0.05,
            gains: Gains::default(),
            throttle_scale: 1.0,
            invert_pitch: false,
            calibration_sec: 10.0,
            calibration_poll_sec: 0.2,
        }
    }
}

fn require(ok: bool, field: &'static str, reason: &str) -> Result<(), FlystickError> {
    if ok {
        Ok(())
    } else {
        Err(FlystickError::invalid(field, reason))
    }
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl Settings {
    /// Startup checks; filter cutoffs are left to the filter builder, which disables bad stages.
    pub fn validate(&self) -> Result<(), FlystickError> {
        if let Some(fs) = self.sample_rate {
            require(fs.is_finite() && fs > 0.0, "sample_rate", "must be > 0")?;
        }
        require(
            self.window_sec.is_finite() && self.window_sec > 0.0,
            "window_sec",
            "must be > 0",
        )?;
        require(
            self.hop_sec.is_finite() && self.hop_sec > 0.0,
            "hop_sec",
            "must be > 0",
        )?;
        require(
            self.hop_sec <= self.window_sec,
            "hop_sec",
            "must not exceed window_sec",
        )?;
        require(
            (0.0..=1.0).contains(&self.ewma_alpha),
            "ewma_alpha",
            "must lie in [0, 1]",
        )?;
        require(non_negative(self.dead_band), "dead_band", "must be >= 0")?;
        for axis in Axis::ALL {
            require(non_negative(self.gains.get(axis)), "gains", "every gain must be >= 0")?;
        }
        require(
            non_negative(self.throttle_scale),
            "throttle_scale",
            "must be >= 0",
        )?;
        require(
            non_negative(self.calibration_sec),
            "calibration_sec",
            "must be >= 0",
        )?;
        require(
            self.calibration_poll_sec.is_finite() && self.calibration_poll_sec > 0.0,
            "calibration_poll_sec",
            "must be > 0",
        )?;
        Ok(())
    }

    pub fn window_samples(&self, sample_rate_hz: f64) -> usize {
        (self.window_sec * sample_rate_hz) as usize
    }

    pub fn hop(&self) -> Duration {
        Duration::from_secs_f64(self.hop_sec)
    }

    pub fn calibration(&self) -> Duration {
        Duration::from_secs_f64(self.calibration_sec)
    }

    pub fn calibration_poll(&self) -> Duration {
        Duration::from_secs_f64(self.calibration_poll_sec)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub host: String,
    pub port: u16,
    /// Extra `host:port` targets that receive a copy of every datagram.
    pub fanout: Vec<String>,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5005,
            fanout: Vec::new(),
        }
    }
}

impl UdpConfig {
    pub fn primary(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses the comma-separated fan-out list; blank entries are dropped.
pub fn parse_fanout(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn fanout_from_env() -> Vec<String> {
    std::env::var(UDP_FANOUT_ENV)
        .map(|raw| parse_fanout(&raw))
        .unwrap_or_default()
}

impl Profile {
    pub fn from_json(text: &str) -> Result<Self, FlystickError> {
        let profile: Profile = serde_json::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self, FlystickError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), FlystickError> {
        self.settings.validate()?;
        self.board.layout()?;
        if !self.mock_mode {
            self.board.resolve_board_id()?;
        }
        require(!self.udp.host.trim().is_empty(), "udp.host", "must not be empty")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Profile::default().validate().is_ok());
    }

    #[test]
    fn parses_partial_profile_with_defaults() {
        let profile = Profile::from_json(
            r#"{
                "board": {"serial_port": "COM9", "board_id": "cyton",
                          "channels": {"C3": 0, "C4": 1, "Cz": 2, "Oz": 3}},
                "settings": {"sample_rate": 250, "bandpass": [1.0, 40.0], "hop_sec": 0.25,
                             "gains": {"yaw": 2.0, "speed": 0.5}},
                "udp": {"host": "127.0.0.1", "port": 6000}
            }"#,
        )
        .unwrap();
        assert_eq!(profile.board.serial_port, "COM9");
        assert_eq!(profile.settings.bandpass, Some((1.0, 40.0)));
        assert_eq!(profile.settings.hop_sec, 0.25);
        assert_eq!(profile.settings.window_sec, 1.0);
        assert_eq!(profile.settings.gains.yaw, 2.0);
        assert_eq!(profile.settings.gains.throttle, 0.5);
        assert_eq!(profile.settings.gains.altitude, 1.0);
        assert_eq!(profile.udp.primary(), "127.0.0.1:6000");
    }

    #[test]
    fn shipped_profile_matches_defaults() {
        let profile = Profile::from_json(include_str!("../profiles/default.json")).unwrap();
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn null_notch_disables_it() {
        let profile = Profile::from_json(r#"{"settings": {"notch": null}}"#).unwrap();
        assert_eq!(profile.settings.notch, None);
    }

    #[test]
    fn missing_channel_role_is_fatal() {
        let err = Profile::from_json(r#"{"board": {"channels": {"C3": 0, "C4": 1}}}"#).unwrap_err();
        assert!(matches!(err, FlystickError::MissingChannel(ChannelRole::Cz)));
    }

    #[test]
    fn hop_longer_than_window_is_rejected() {
        let settings = Settings {
            window_sec: 1.0,
            hop_sec: 1.5,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(FlystickError::InvalidConfig { field: "hop_sec", .. })
        ));
    }

    #[test]
    fn alpha_and_gains_are_range_checked() {
        let settings = Settings {
            ewma_alpha: 1.2,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        let settings = Settings {
            gains: Gains {
                pitch: -1.0,
                ..Gains::default()
            },
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        let settings = Settings {
            dead_band: -0.1,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn board_aliases_resolve() {
        assert_eq!(resolve_board_id("cyton").unwrap(), 0);
        assert_eq!(resolve_board_id("CYTON").unwrap(), 0);
        assert_eq!(resolve_board_id("Cyton-Daisy").unwrap(), 2);
        assert_eq!(resolve_board_id("-1").unwrap(), -1);
        assert_eq!(resolve_board_id(" -3 ").unwrap(), -3);
        assert_eq!(resolve_board_id("7").unwrap(), 7);
        assert!(resolve_board_id("muse").is_err());
        assert!(resolve_board_id("-x").is_err());
    }

    #[test]
    fn negative_board_id_profile_is_valid() {
        let profile = Profile::from_json(r#"{"board": {"board_id": "-1"}}"#).unwrap();
        assert_eq!(profile.board.resolve_board_id().unwrap(), -1);
    }

    #[test]
    fn window_samples_truncate() {
        let settings = Settings {
            window_sec: 2.0,
            ..Settings::default()
        };
        assert_eq!(settings.window_samples(250.0), 500);
        assert_eq!(settings.window_samples(125.5), 251);
    }

    #[test]
    fn fanout_list_parsing() {
        assert_eq!(
            parse_fanout(" 127.0.0.1:6001, ,10.0.0.2:7000 "),
            vec!["127.0.0.1:6001".to_string(), "10.0.0.2:7000".to_string()]
        );
        assert!(parse_fanout("").is_empty());
    }

    #[test]
    fn bad_json_is_a_parse_error() {
        assert!(matches!(
            Profile::from_json("{ not json"),
            Err(FlystickError::ConfigParse(_))
        ));
    }
}
