pub mod channel;
pub mod fft;
pub mod peaks;
pub mod window;

pub use channel::{decimation_for, ChannelFilter};
pub use fft::SpectrumAnalyzer;
pub use peaks::{detect_peaks, PeakDetector};
