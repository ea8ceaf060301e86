use std::sync::{Arc, Mutex};

use num_complex::Complex32;
use skim_dsp::{ChannelFilter, SpectrumAnalyzer};

/// A processing stage. Each call consumes one block of input and returns the
/// output handed to every downstream block. Sinks return nothing.
pub trait Block: Send {
    fn name(&self) -> &str;
    fn work(&mut self, input: &[Complex32]) -> Vec<Complex32>;
}

/// Root of the graph: forwards source buffers unchanged.
pub struct SourceTap;

impl Block for SourceTap {
    fn name(&self) -> &str {
        "source"
    }

    fn work(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        input.to_vec()
    }
}

/// Latest spectrum published by a [`SpectrumProbe`].
pub type SharedSpectrum = Arc<Mutex<Option<Vec<f32>>>>;

/// Cuts the stream into `fft_width` vectors, keeps one in `keep_one_in`, and
/// publishes its power spectrum for the detector to poll.
pub struct SpectrumProbe {
    analyzer: SpectrumAnalyzer,
    pending: Vec<Complex32>,
    keep_one_in: usize,
    counter: usize,
    latest: SharedSpectrum,
}

impl SpectrumProbe {
    pub fn new(fft_width: usize, keep_one_in: usize) -> Self {
        Self {
            analyzer: SpectrumAnalyzer::new(fft_width),
            pending: Vec::with_capacity(fft_width * 2),
            keep_one_in: keep_one_in.max(1),
            counter: 0,
            latest: Arc::new(Mutex::new(None)),
        }
    }

    pub fn shared(&self) -> SharedSpectrum {
        self.latest.clone()
    }
}

impl Block for SpectrumProbe {
    fn name(&self) -> &str {
        "spectrum-probe"
    }

    fn work(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        let size = self.analyzer.size();
        self.pending.extend_from_slice(input);

        let mut consumed = 0;
        while self.pending.len() - consumed >= size {
            if self.counter == 0 {
                let power = self.analyzer.power(&self.pending[consumed..consumed + size]);
                match self.latest.lock() {
                    Ok(mut slot) => *slot = Some(power),
                    Err(poisoned) => *poisoned.into_inner() = Some(power),
                }
            }
            self.counter = (self.counter + 1) % self.keep_one_in;
            consumed += size;
        }
        self.pending.drain(..consumed);
        Vec::new()
    }
}

/// A channel: frequency translation, lowpass and decimation.
pub struct ChannelBlock {
    name: String,
    filter: ChannelFilter,
}

impl ChannelBlock {
    pub fn new(filter: ChannelFilter) -> Self {
        Self {
            name: format!("channel@{:.1}", filter.carrier_freq()),
            filter,
        }
    }

    pub fn output_rate(&self) -> f64 {
        self.filter.output_rate()
    }
}

impl Block for ChannelBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn work(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        self.filter.process(input)
    }
}
