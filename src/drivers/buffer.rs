use std::collections::VecDeque;
use crate::drivers::FlystickError;
use crate::drivers::SampleBlock;
/// Rolling buffer that stores recent samples per channel.
///
/// Mirrors the board-side ring buffer: readers ask for the newest `n` samples
/// and get fewer when the buffer has not filled up yet.
pub struct SignalBuffer {
    per_channel: Vec<VecDeque<f64>>, // channel -> samples
    sample_rate_hz: f64,
    capacity: usize,
}
impl SignalBuffer {
    pub fn with_history_seconds(
        channel_count: usize,
        sample_rate_hz: f64,
        history_seconds: f64,
    ) -> Result<Self, FlystickError> {
        if !(sample_rate_hz > 0.0) {
            return Err(FlystickError::InvalidSampleRate);
        }
        let capacity = ((sample_rate_hz * history_seconds).ceil() as usize).max(1);
        let per_channel = (0..channel_count)
            .map(|_| VecDeque::with_capacity(capacity))
            .collect();
        Ok(Self {
            per_channel,
            sample_rate_hz,
            capacity,
        })
    }
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    /// Number of samples available on every channel.
    pub fn buffered(&self) -> usize {
        self.per_channel.iter().map(VecDeque::len).min().unwrap_or(0)
    }
    pub fn push_samples(&mut self, samples: &[Vec<f64>]) -> Result<(), FlystickError> {
        if samples.len() != self.per_channel.len() {
            return Err(FlystickError::ChannelMismatch {
                expected: self.per_channel.len(),
                actual: samples.len(),
            });
        }
        for (channel_queue, new_samples) in self.per_channel.iter_mut().zip(samples) {
            for &sample in new_samples {
                if channel_queue.len() == self.capacity {
                    channel_queue.pop_front();
                }
                channel_queue.push_back(sample);
            }
        }
        Ok(())
    }
    /// Newest `samples` values per channel, or everything buffered if that is less.
    pub fn latest(&self, samples: usize) -> Result<SampleBlock, FlystickError> {
        let take = samples.min(self.buffered());
        let rows: Vec<Vec<f64>> = self
            .per_channel
            .iter()
            .map(|channel| channel.iter().skip(channel.len() - take).copied().collect())
            .collect();
        SampleBlock::from_rows(self.sample_rate_hz, rows)
    }
}
