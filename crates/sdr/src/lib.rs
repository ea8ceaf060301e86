pub mod file;
pub mod tone;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam::channel::Sender;
use num_complex::Complex32;

/// Sample buffer: a block of complex baseband samples
pub struct SampleBuf {
    pub data: Vec<Complex32>,
}

impl SampleBuf {
    /// Number of complex samples
    pub fn num_samples(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported WAV layout: {0}")]
    WavLayout(String),
}

/// Common trait for all sample sources
pub trait SdrSource: Send {
    /// Start streaming samples into the channel.
    /// Runs until the running flag is cleared, the input ends, or an error occurs.
    fn start(&mut self, tx: Sender<SampleBuf>) -> Result<(), SourceError>;

    /// Flag polled by `start`; clearing it asks the source to stop
    fn running_flag(&self) -> Arc<AtomicBool>;

    /// Get the sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Get the reference centre frequency in Hz
    fn center_frequency(&self) -> f64;
}
