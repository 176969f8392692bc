// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod buffer;
pub mod error;
pub mod fft;
pub mod filter;
pub mod pipeline;
pub mod source;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::SignalBuffer;
pub use error::FlystickError;
pub use fft::{bandpower, PowerSpectrum, SpectrumBuilder};
pub use filter::FilterPipeline;
pub use pipeline::{BandPowers, FeaturePipeline};
pub use source::{
    AcquisitionSource, ChannelGenerator, ChannelLayout, ManualSource, SampleBlock, SyntheticSource,
    Timebase, Tone,
};
