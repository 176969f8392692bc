//! OpenBCI acquisition through the BrainFlow `BoardController` shared library.
//!
//! Signatures follow the BrainFlow 5.x C API, where the data and metadata
//! calls take a preset argument (`PRESET_DEFAULT`). Input params travel as the
//! JSON form of `BrainFlowInputParams`.
use anyhow::{anyhow, bail, Context, Result};
use libloading::Library;
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::ffi::CString;
use std::os::raw::{c_char, c_double, c_int};

use crate::config::BoardConfig;
use crate::drivers::{AcquisitionSource, ChannelLayout, SampleBlock};
use crate::types::ChannelRole;

const PRESET_DEFAULT: c_int = 0;
const STREAM_RINGBUF_PACKETS: c_int = 450_000;

#[derive(Serialize)]
struct BrainFlowInputParams {
    serial_port: String,
    mac_address: String,
    ip_address: String,
    ip_address_aux: String,
    ip_address_anc: String,
    ip_port: i32,
    ip_port_aux: i32,
    ip_port_anc: i32,
    ip_protocol: i32,
    other_info: String,
    timeout: i32,
    serial_number: String,
    file: String,
    file_aux: String,
    file_anc: String,
    master_board: i32,
}

impl BrainFlowInputParams {
    fn for_serial(port: &str) -> Self {
        Self {
            serial_port: port.to_string(),
            mac_address: String::new(),
            ip_address: String::new(),
            ip_address_aux: String::new(),
            ip_address_anc: String::new(),
            ip_port: 0,
            ip_port_aux: 0,
            ip_port_anc: 0,
            ip_protocol: 0,
            other_info: String::new(),
            timeout: 0,
            serial_number: String::new(),
            file: String::new(),
            file_aux: String::new(),
            file_anc: String::new(),
            master_board: -100, // NO_BOARD
        }
    }
}

struct BrainFlowApi {
    #[allow(dead_code)]
    lib: Library,
    prepare_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    start_stream: unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char) -> c_int,
    stop_stream: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    release_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    get_sampling_rate: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_num_rows: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_eeg_channels: unsafe extern "C" fn(c_int, c_int, *mut c_int, *mut c_int) -> c_int,
    get_current_board_data: unsafe extern "C" fn(
        c_int,
        c_int,
        *mut c_double,
        *mut c_int,
        c_int,
        *const c_char,
    ) -> c_int,
}

impl BrainFlowApi {
    fn load() -> Result<Self> {
        // BoardController.dll / libBoardController.so 需要放在工作目录或系统库路径
        let name = libloading::library_filename("BoardController");
        let lib = unsafe { Library::new(&name) }
            .with_context(|| format!("{} not found", name.to_string_lossy()))?;
        // Safety: signatures follow the BrainFlow C API.
        unsafe {
            Ok(Self {
                prepare_session: *lib.get(b"prepare_session\0")?,
                start_stream: *lib.get(b"start_stream\0")?,
                stop_stream: *lib.get(b"stop_stream\0")?,
                release_session: *lib.get(b"release_session\0")?,
                get_sampling_rate: *lib.get(b"get_sampling_rate\0")?,
                get_num_rows: *lib.get(b"get_num_rows\0")?,
                get_eeg_channels: *lib.get(b"get_eeg_channels\0")?,
                get_current_board_data: *lib.get(b"get_current_board_data\0")?,
                lib,
            })
        }
    }

    fn instance() -> Result<&'static BrainFlowApi> {
        static API: OnceCell<BrainFlowApi> = OnceCell::new();
        API.get_or_try_init(Self::load)
    }

    fn check(code: c_int, ctx: &str) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(anyhow!("{ctx} failed (BrainFlow code {code})"))
        }
    }

    fn prepare(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.prepare_session)(board_id, input.as_ptr()) },
            "prepare_session",
        )
    }

    fn start_stream(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe {
                (self.start_stream)(
                    STREAM_RINGBUF_PACKETS,
                    std::ptr::null(),
                    board_id,
                    input.as_ptr(),
                )
            },
            "start_stream",
        )
    }

    fn stop_stream(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.stop_stream)(board_id, input.as_ptr()) },
            "stop_stream",
        )
    }

    fn release(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.release_session)(board_id, input.as_ptr()) },
            "release_session",
        )
    }

    fn sampling_rate(&self, board_id: c_int) -> Result<c_int> {
        let mut rate: c_int = 0;
        Self::check(
            unsafe { (self.get_sampling_rate)(board_id, PRESET_DEFAULT, &mut rate as *mut c_int) },
            "get_sampling_rate",
        )?;
        Ok(rate)
    }

    fn num_rows(&self, board_id: c_int) -> Result<c_int> {
        let mut rows: c_int = 0;
        Self::check(
            unsafe { (self.get_num_rows)(board_id, PRESET_DEFAULT, &mut rows as *mut c_int) },
            "get_num_rows",
        )?;
        Ok(rows)
    }

    fn eeg_channels(&self, board_id: c_int, max_channels: usize) -> Result<Vec<c_int>> {
        let mut out_len: c_int = 0;
        let mut buf = vec![0 as c_int; max_channels.max(32)];
        Self::check(
            unsafe {
                (self.get_eeg_channels)(
                    board_id,
                    PRESET_DEFAULT,
                    buf.as_mut_ptr(),
                    &mut out_len as *mut c_int,
                )
            },
            "get_eeg_channels",
        )?;
        buf.truncate(out_len.max(0) as usize);
        Ok(buf)
    }

    /// Copies up to `num_samples` newest samples into `buffer` without draining the ring.
    fn current_board_data(
        &self,
        board_id: c_int,
        num_rows: usize,
        input: &CString,
        num_samples: usize,
        buffer: &mut [f64],
    ) -> Result<usize> {
        let expected = num_rows * num_samples;
        if buffer.len() < expected {
            bail!("buffer too small: {} < {}", buffer.len(), expected);
        }
        let mut current_size: c_int = 0;
        Self::check(
            unsafe {
                (self.get_current_board_data)(
                    num_samples as c_int,
                    PRESET_DEFAULT,
                    buffer.as_mut_ptr(),
                    &mut current_size as *mut c_int,
                    board_id,
                    input.as_ptr(),
                )
            },
            "get_current_board_data",
        )?;
        Ok((current_size.max(0) as usize).min(num_samples))
    }
}

/// Maps each channel role to its absolute BrainFlow data row.
fn role_rows(layout: &ChannelLayout, eeg_channels: &[c_int], num_rows: usize) -> Result<[usize; 4]> {
    let mut rows = [0usize; 4];
    for role in ChannelRole::ALL {
        let eeg_index = layout.row(role);
        let row = *eeg_channels.get(eeg_index).ok_or_else(|| {
            anyhow!(
                "{role} mapped to EEG channel {eeg_index}, board only has {}",
                eeg_channels.len()
            )
        })?;
        let row = usize::try_from(row).context("negative EEG row from BrainFlow")?;
        if row >= num_rows {
            bail!("EEG row {row} for {role} is outside the {num_rows}-row data block");
        }
        rows[role.index()] = row;
    }
    Ok(rows)
}

/// BrainFlow 返回按行存储: row * available + i
fn pick_rows(buffer: &[f64], available: usize, rows: &[usize; 4]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|&row| buffer[row * available..(row + 1) * available].to_vec())
        .collect()
}

/// BrainFlow-backed OpenBCI session.
///
/// Prepared and streaming from construction, released on drop. Windows are
/// read with `get_current_board_data`, which peeks at the newest samples
/// without consuming them, so overlapping hops see overlapping data.
pub struct OpenBciSession {
    port_name: String,
    board_id: c_int,
    api: &'static BrainFlowApi,
    input_json: CString,
    layout: ChannelLayout,
    role_rows: [usize; 4],
    num_rows: usize,
    sample_rate_hz: f64,
    is_streaming: bool,
    released: bool,
}

impl OpenBciSession {
    pub fn connect(board: &BoardConfig) -> Result<Self> {
        let board_id = board.resolve_board_id()?;
        let layout = board.layout()?;
        let api = BrainFlowApi::instance()?;
        let params = BrainFlowInputParams::for_serial(&board.serial_port);
        let json = serde_json::to_string(&params)?;
        let input_json =
            CString::new(json).context("failed to encode BrainFlow input params to C string")?;
        api.prepare(board_id, &input_json)
            .with_context(|| format!("board {board_id} on {}", board.serial_port))?;
        let mut session = Self {
            port_name: board.serial_port.clone(),
            board_id,
            api,
            input_json,
            layout,
            role_rows: [0; 4],
            num_rows: 0,
            sample_rate_hz: 0.0,
            is_streaming: false,
            released: false,
        };
        // 从这里开始 Drop 会负责 release
        session.sample_rate_hz = api.sampling_rate(board_id)? as f64;
        session.num_rows = api.num_rows(board_id)? as usize;
        let eeg_channels = api.eeg_channels(board_id, session.num_rows)?;
        session.role_rows = role_rows(&session.layout, &eeg_channels, session.num_rows)?;
        session.start_stream()?;
        info!(
            "board {} on {} streaming at {} Hz, rows {:?}",
            board_id, session.port_name, session.sample_rate_hz, session.role_rows
        );
        Ok(session)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn start_stream(&mut self) -> Result<()> {
        if !self.is_streaming {
            self.api.start_stream(self.board_id, &self.input_json)?;
            self.is_streaming = true;
        }
        Ok(())
    }

    pub fn stop_stream(&mut self) -> Result<()> {
        if !self.released {
            if self.is_streaming {
                self.api.stop_stream(self.board_id, &self.input_json)?;
                self.is_streaming = false;
            }
            self.api.release(self.board_id, &self.input_json)?;
            self.released = true;
        }
        Ok(())
    }
}

impl AcquisitionSource for OpenBciSession {
    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    fn channel_layout(&self) -> &ChannelLayout {
        &self.layout
    }

    fn get_window(&mut self, samples: usize) -> Result<SampleBlock> {
        if self.released {
            bail!("session on {} already released", self.port_name);
        }
        let mut buf = vec![0.0f64; self.num_rows * samples];
        let available = self.api.current_board_data(
            self.board_id,
            self.num_rows,
            &self.input_json,
            samples,
            &mut buf,
        )?;
        let rows = pick_rows(&buf, available, &self.role_rows);
        Ok(SampleBlock::from_rows(self.sample_rate_hz, rows)?)
    }
}

impl Drop for OpenBciSession {
    fn drop(&mut self) {
        if let Err(err) = self.stop_stream() {
            warn!("failed to release board session: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_params_serialize_for_serial_port() {
        let json = serde_json::to_string(&BrainFlowInputParams::for_serial("COM7")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["serial_port"], "COM7");
        assert_eq!(value["master_board"], -100);
        assert_eq!(value["ip_port"], 0);
    }

    #[test]
    fn roles_resolve_through_eeg_channel_list() {
        // Cyton: row 0 is the packet counter, EEG in rows 1..=8
        let eeg: Vec<c_int> = (1..=8).collect();
        let layout = ChannelLayout::new(2, 4, 0, 7);
        assert_eq!(role_rows(&layout, &eeg, 24).unwrap(), [3, 5, 1, 8]);
    }

    #[test]
    fn role_outside_eeg_list_is_rejected() {
        let eeg: Vec<c_int> = (1..=4).collect();
        let layout = ChannelLayout::new(0, 1, 2, 9);
        assert!(role_rows(&layout, &eeg, 24).is_err());
    }

    #[test]
    fn picks_row_major_samples() {
        // 3 rows x 2 samples
        let buf = [0.0, 0.5, 10.0, 11.0, 20.0, 21.0];
        let rows = pick_rows(&buf, 2, &[1, 2, 1, 0]);
        assert_eq!(rows[0], vec![10.0, 11.0]);
        assert_eq!(rows[1], vec![20.0, 21.0]);
        assert_eq!(rows[3], vec![0.0, 0.5]);
    }
}
