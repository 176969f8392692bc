// src/lib.rs
//! EEG band power to four-axis joystick commands.
//!
//! Raw samples come from an [`drivers::AcquisitionSource`], are filtered and
//! reduced to band powers, compared against a resting baseline, and mapped to
//! yaw / altitude / pitch / throttle by [`engine::ControlMapper`].
pub mod brain_utils;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod openbci;
pub mod transport;
pub mod types;
