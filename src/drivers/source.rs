use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::PI;
use std::time::Instant;
use anyhow::Result;
use ndarray::{s, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use crate::drivers::{FlystickError, SignalBuffer};
use crate::types::ChannelRole;
/// Rectangular block of samples, one row per [`ChannelRole`] (in `ChannelRole::ALL` order).
#[derive(Clone, Debug)]
pub struct SampleBlock {
    sample_rate_hz: f64,
    data: Array2<f64>, // roles x samples
}
impl SampleBlock {
    pub fn new(sample_rate_hz: f64, data: Array2<f64>) -> Result<Self, FlystickError> {
        if !(sample_rate_hz > 0.0) {
            return Err(FlystickError::InvalidSampleRate);
        }
        if data.nrows() != ChannelRole::ALL.len() {
            return Err(FlystickError::ChannelMismatch {
                expected: ChannelRole::ALL.len(),
                actual: data.nrows(),
            });
        }
        Ok(Self {
            sample_rate_hz,
            data,
        })
    }
    /// Builds a block from per-role rows; rows must all have the same length.
    pub fn from_rows(sample_rate_hz: f64, rows: Vec<Vec<f64>>) -> Result<Self, FlystickError> {
        let channels = rows.len();
        let len = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(short) = rows.iter().map(Vec::len).find(|&l| l != len) {
            return Err(FlystickError::InsufficientData {
                required: len,
                available: short,
            });
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((channels, len), flat).map_err(|_| {
            FlystickError::ChannelMismatch {
                expected: ChannelRole::ALL.len(),
                actual: channels,
            }
        })?;
        Self::new(sample_rate_hz, data)
    }
    pub fn empty(sample_rate_hz: f64) -> Result<Self, FlystickError> {
        Self::new(sample_rate_hz, Array2::zeros((ChannelRole::ALL.len(), 0)))
    }
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
    pub fn samples_per_channel(&self) -> usize {
        self.data.ncols()
    }
    pub fn channel(&self, role: ChannelRole) -> Vec<f64> {
        self.data.row(role.index()).to_vec()
    }
    /// Fails with [`FlystickError::InsufficientData`] when the block is shorter than `required`.
    pub fn ensure_complete(&self, required: usize) -> Result<(), FlystickError> {
        let available = self.samples_per_channel();
        if available < required {
            return Err(FlystickError::InsufficientData {
                required,
                available,
            });
        }
        Ok(())
    }
    /// Newest `samples` columns of the block.
    pub fn tail(&self, samples: usize) -> SampleBlock {
        let start = self.samples_per_channel().saturating_sub(samples);
        SampleBlock {
            sample_rate_hz: self.sample_rate_hz,
            data: self.data.slice(s![.., start..]).to_owned(),
        }
    }
}
/// Which board EEG row carries each channel role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelLayout {
    rows: [usize; 4],
}
impl ChannelLayout {
    pub fn new(c3: usize, c4: usize, cz: usize, oz: usize) -> Self {
        Self {
            rows: [c3, c4, cz, oz],
        }
    }
    pub fn from_map(map: &BTreeMap<String, usize>) -> Result<Self, FlystickError> {
        let mut rows = [0usize; 4];
        for role in ChannelRole::ALL {
            rows[role.index()] = *map
                .get(role.label())
                .ok_or(FlystickError::MissingChannel(role))?;
        }
        Ok(Self { rows })
    }
    pub fn row(&self, role: ChannelRole) -> usize {
        self.rows[role.index()]
    }
}
impl Default for ChannelLayout {
    fn default() -> Self {
        Self::new(0, 1, 2, 3)
    }
}
/// Capability interface over an acquisition device.
///
/// `get_window` never blocks on the device; it returns whatever is buffered,
/// which may be shorter than requested.
pub trait AcquisitionSource {
    fn sample_rate_hz(&self) -> f64;
    fn channel_layout(&self) -> &ChannelLayout;
    fn get_window(&mut self, samples: usize) -> Result<SampleBlock>;
}
/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    sample_rate_hz: f64,
    layout: ChannelLayout,
    queue: VecDeque<SampleBlock>,
}
impl ManualSource {
    pub fn new(sample_rate_hz: f64, blocks: impl IntoIterator<Item = SampleBlock>) -> Self {
        Self {
            sample_rate_hz,
            layout: ChannelLayout::default(),
            queue: blocks.into_iter().collect(),
        }
    }
}
impl AcquisitionSource for ManualSource {
    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
    fn channel_layout(&self) -> &ChannelLayout {
        &self.layout
    }
    fn get_window(&mut self, samples: usize) -> Result<SampleBlock> {
        match self.queue.pop_front() {
            Some(block) => Ok(block.tail(samples)),
            None => Ok(SampleBlock::empty(self.sample_rate_hz)?),
        }
    }
}
/// One sinusoidal component of a synthetic channel.
#[derive(Clone, Copy, Debug)]
pub struct Tone {
    pub freq_hz: f64,
    pub amplitude_uv: f64,
    pub phase: f64,
}
impl Tone {
    pub fn new(freq_hz: f64, amplitude_uv: f64) -> Self {
        Self {
            freq_hz,
            amplitude_uv,
            phase: 0.0,
        }
    }
}
#[derive(Clone, Debug, Default)]
pub struct ChannelGenerator {
    pub tones: Vec<Tone>,
    pub noise_uv: f64,
}
impl ChannelGenerator {
    pub fn tones(tones: impl IntoIterator<Item = Tone>) -> Self {
        Self {
            tones: tones.into_iter().collect(),
            noise_uv: 0.0,
        }
    }
    fn sample(&self, t: f64, rng: &mut StdRng) -> f64 {
        let base: f64 = self
            .tones
            .iter()
            .map(|tone| (2.0 * PI * tone.freq_hz * t + tone.phase).sin() * tone.amplitude_uv)
            .sum();
        if self.noise_uv > 0.0 {
            base + rng.gen_range(-self.noise_uv..self.noise_uv)
        } else {
            base
        }
    }
}
/// How the synthetic source decides how many new samples exist at each pull.
#[derive(Clone, Copy, Debug)]
pub enum Timebase {
    /// Samples accrue with real elapsed time, like a streaming board.
    WallClock,
    /// Every pull generates exactly this many new samples.
    Stepped(usize),
}
/// Sinusoid generator standing in for an EEG board.
pub struct SyntheticSource {
    layout: ChannelLayout,
    generators: Vec<ChannelGenerator>, // role -> generator
    buffer: SignalBuffer,
    timebase: Timebase,
    generated: u64,
    started_at: Instant,
    rng: StdRng,
}
impl SyntheticSource {
    pub fn new(
        sample_rate_hz: f64,
        history_seconds: f64,
        generators: [ChannelGenerator; 4],
        timebase: Timebase,
    ) -> Result<Self, FlystickError> {
        let buffer =
            SignalBuffer::with_history_seconds(ChannelRole::ALL.len(), sample_rate_hz, history_seconds)?;
        Ok(Self {
            layout: ChannelLayout::default(),
            generators: generators.into(),
            buffer,
            timebase,
            generated: 0,
            started_at: Instant::now(),
            rng: StdRng::seed_from_u64(0x5EED),
        })
    }
    /// Resting-state-like signal: mu/alpha at 10 Hz, beta at 20 Hz.
    pub fn resting(
        sample_rate_hz: f64,
        history_seconds: f64,
        timebase: Timebase,
    ) -> Result<Self, FlystickError> {
        let motor = ChannelGenerator::tones([Tone::new(10.0, 20.0), Tone::new(20.0, 6.0)]);
        let central = ChannelGenerator::tones([Tone::new(10.0, 15.0), Tone::new(20.0, 8.0)]);
        let occipital = ChannelGenerator::tones([Tone::new(10.0, 30.0)]);
        Self::new(
            sample_rate_hz,
            history_seconds,
            [motor.clone(), motor, central, occipital],
            timebase,
        )
    }
    /// Adds uniform noise of `noise_uv` to every channel, seeded for reproducibility.
    pub fn with_noise(mut self, noise_uv: f64, seed: u64) -> Self {
        for generator in &mut self.generators {
            generator.noise_uv = noise_uv.max(0.0);
        }
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
    fn pump(&mut self) -> Result<(), FlystickError> {
        let fs = self.buffer.sample_rate_hz();
        let target = match self.timebase {
            Timebase::WallClock => (self.started_at.elapsed().as_secs_f64() * fs) as u64,
            Timebase::Stepped(step) => self.generated + step as u64,
        };
        if target <= self.generated {
            return Ok(());
        }
        // older samples would be evicted anyway
        let start = self
            .generated
            .max(target.saturating_sub(self.buffer.capacity() as u64));
        let mut rows = vec![Vec::with_capacity((target - start) as usize); self.generators.len()];
        for index in start..target {
            let t = index as f64 / fs;
            for (row, generator) in rows.iter_mut().zip(&self.generators) {
                row.push(generator.sample(t, &mut self.rng));
            }
        }
        self.buffer.push_samples(&rows)?;
        self.generated = target;
        Ok(())
    }
}
impl AcquisitionSource for SyntheticSource {
    fn sample_rate_hz(&self) -> f64 {
        self.buffer.sample_rate_hz()
    }
    fn channel_layout(&self) -> &ChannelLayout {
        &self.layout
    }
    fn get_window(&mut self, samples: usize) -> Result<SampleBlock> {
        self.pump()?;
        Ok(self.buffer.latest(samples)?)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn block_rejects_ragged_rows() {
        let rows = vec![vec![0.0; 4], vec![0.0; 4], vec![0.0; 3], vec![0.0; 4]];
        assert!(SampleBlock::from_rows(250.0, rows).is_err());
    }
    #[test]
    fn block_requires_four_roles() {
        let rows = vec![vec![0.0; 4], vec![0.0; 4]];
        assert!(matches!(
            SampleBlock::from_rows(250.0, rows),
            Err(FlystickError::ChannelMismatch { .. })
        ));
    }
    #[test]
    fn ensure_complete_reports_shortfall() {
        let block = SampleBlock::from_rows(250.0, vec![vec![1.0; 10]; 4]).unwrap();
        assert!(block.ensure_complete(10).is_ok());
        match block.ensure_complete(11) {
            Err(FlystickError::InsufficientData {
                required,
                available,
            }) => {
                assert_eq!(required, 11);
                assert_eq!(available, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    #[test]
    fn tail_keeps_newest_columns() {
        let rows = (0..4).map(|_| vec![1.0, 2.0, 3.0, 4.0]).collect();
        let block = SampleBlock::from_rows(250.0, rows).unwrap();
        assert_eq!(block.tail(2).channel(ChannelRole::C4), vec![3.0, 4.0]);
        assert_eq!(block.tail(10).samples_per_channel(), 4);
    }
    #[test]
    fn layout_from_map_requires_every_role() {
        let mut map = BTreeMap::new();
        map.insert("C3".to_string(), 0);
        map.insert("C4".to_string(), 1);
        assert!(matches!(
            ChannelLayout::from_map(&map),
            Err(FlystickError::MissingChannel(ChannelRole::Cz))
        ));
        map.insert("Cz".to_string(), 2);
        map.insert("Oz".to_string(), 7);
        let layout = ChannelLayout::from_map(&map).unwrap();
        assert_eq!(layout.row(ChannelRole::Oz), 7);
    }
    #[test]
    fn manual_source_runs_dry_with_empty_blocks() {
        let mut source = ManualSource::new(250.0, Vec::new());
        let block = source.get_window(100).unwrap();
        assert_eq!(block.samples_per_channel(), 0);
    }
    #[test]
    fn stepped_synthetic_source_fills_up() {
        let mut source = SyntheticSource::resting(250.0, 4.0, Timebase::Stepped(125)).unwrap();
        assert_eq!(source.get_window(250).unwrap().samples_per_channel(), 125);
        assert_eq!(source.get_window(250).unwrap().samples_per_channel(), 250);
        assert_eq!(source.get_window(250).unwrap().samples_per_channel(), 250);
    }
    #[test]
    fn synthetic_signal_is_deterministic() {
        let mut a = SyntheticSource::resting(250.0, 2.0, Timebase::Stepped(100))
            .unwrap()
            .with_noise(2.0, 7);
        let mut b = SyntheticSource::resting(250.0, 2.0, Timebase::Stepped(100))
            .unwrap()
            .with_noise(2.0, 7);
        let wa = a.get_window(100).unwrap();
        let wb = b.get_window(100).unwrap();
        assert_eq!(wa.channel(ChannelRole::Oz), wb.channel(ChannelRole::Oz));
    }
}
