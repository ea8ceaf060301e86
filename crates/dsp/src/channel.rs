use num_complex::Complex32;
use std::f64::consts::PI;

use crate::window;

/// Transition width of the channel lowpass, in Hz.
pub const CHANNEL_TRANSITION_HZ: f64 = 20.0;
/// Stopband attenuation used for the channel tap-count estimate.
pub const CHANNEL_ATTENUATION_DB: f64 = 10.0;

/// Decimation for a channel of `bandwidth` Hz carved out of `source_rate`:
/// the output keeps roughly four samples per Hz of bandwidth.
///
/// Returns 0 when the bandwidth is too wide (or non-positive) for the
/// source rate, which callers must treat as an allocation failure.
pub fn decimation_for(source_rate: f64, bandwidth: f64) -> usize {
    if !(bandwidth > 0.0 && source_rate > 0.0) {
        return 0;
    }
    (source_rate / bandwidth / 4.0).floor() as usize
}

/// Frequency-translating decimating FIR filter.
///
/// Mixes the input by `-carrier_freq` so the carrier lands at DC,
/// lowpass filters to the channel bandwidth and keeps one output
/// sample per `decimation` inputs.
pub struct ChannelFilter {
    carrier_freq: f64,
    source_rate: f64,
    decimation: usize,
    /// Oscillator phase and step, radians
    phase: f64,
    phase_inc: f64,
    taps: Vec<f32>,
    /// Delay line (circular buffer), one entry per tap
    delay: Vec<Complex32>,
    delay_pos: usize,
    /// Inputs consumed since the last output
    phase_count: usize,
}

impl ChannelFilter {
    /// Create a channel filter.
    ///
    /// - `carrier_freq`: offset of the carrier from the source centre, Hz
    /// - `bandwidth`: channel lowpass cutoff, Hz
    /// - `source_rate`: input sample rate, Hz
    /// - `decimation`: output keeps one sample in `decimation` (must be >= 1)
    pub fn new(carrier_freq: f64, bandwidth: f64, source_rate: f64, decimation: usize) -> Self {
        assert!(decimation >= 1, "decimation must be at least 1");
        let taps: Vec<f32> = window::lowpass(
            bandwidth / source_rate,
            CHANNEL_TRANSITION_HZ / source_rate,
            CHANNEL_ATTENUATION_DB,
        )
        .into_iter()
        .map(|t| t as f32)
        .collect();
        let delay = vec![Complex32::new(0.0, 0.0); taps.len()];

        Self {
            carrier_freq,
            source_rate,
            decimation,
            phase: 0.0,
            phase_inc: -2.0 * PI * carrier_freq / source_rate,
            taps,
            delay,
            delay_pos: 0,
            phase_count: 0,
        }
    }

    /// Mix, filter and decimate a block of input samples.
    pub fn process(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        let mut out = Vec::with_capacity(input.len() / self.decimation + 1);
        for &sample in input {
            let lo = Complex32::new(self.phase.cos() as f32, self.phase.sin() as f32);
            self.phase += self.phase_inc;
            if self.phase > PI {
                self.phase -= 2.0 * PI;
            } else if self.phase < -PI {
                self.phase += 2.0 * PI;
            }

            self.delay[self.delay_pos] = sample * lo;
            self.delay_pos = (self.delay_pos + 1) % self.delay.len();

            self.phase_count += 1;
            if self.phase_count == self.decimation {
                self.phase_count = 0;
                out.push(self.dot_product());
            }
        }
        out
    }

    /// output = sum_{t=0}^{T-1} taps[t] * delay[(pos-1-t) mod T]
    fn dot_product(&self) -> Complex32 {
        let t = self.taps.len();
        let mut acc = Complex32::new(0.0, 0.0);
        for tap in 0..t {
            let delay_idx = (self.delay_pos + t - 1 - tap) % t;
            acc += self.delay[delay_idx] * self.taps[tap];
        }
        acc
    }

    pub fn carrier_freq(&self) -> f64 {
        self.carrier_freq
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    pub fn num_taps(&self) -> usize {
        self.taps.len()
    }

    /// Sample rate of the filter output
    pub fn output_rate(&self) -> f64 {
        self.source_rate / self.decimation as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, rate: f64, len: usize) -> Vec<Complex32> {
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * freq * n as f64 / rate;
                Complex32::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect()
    }

    fn mean_level(samples: &[Complex32]) -> f32 {
        samples.iter().map(|s| s.norm()).sum::<f32>() / samples.len() as f32
    }

    #[test]
    fn test_decimation_for() {
        // PSK31 at 44.1 kHz: 44100 / 80 / 4 = 137.8
        assert_eq!(decimation_for(44100.0, 80.0), 137);
        assert_eq!(decimation_for(8000.0, 2000.0), 1);
        assert_eq!(decimation_for(8000.0, 8000.0), 0);
        assert_eq!(decimation_for(8000.0, 0.0), 0);
    }

    #[test]
    fn test_output_rate_and_length() {
        let rate = 44100.0;
        let decim = decimation_for(rate, 80.0);
        let mut filter = ChannelFilter::new(1000.0, 80.0, rate, decim);
        assert_eq!(filter.decimation(), 137);
        assert!((filter.output_rate() - rate / 137.0).abs() < 1e-9);

        let out = filter.process(&tone(1000.0, rate, decim * 50));
        assert_eq!(out.len(), 50);
        // Partial block is carried over to the next call
        let out = filter.process(&tone(1000.0, rate, decim - 1));
        assert!(out.is_empty());
    }

    #[test]
    fn test_on_carrier_passes_off_carrier_rejected() {
        let rate = 44100.0;
        let decim = decimation_for(rate, 80.0);
        let input_on = tone(1000.0, rate, 44100);
        let input_off = tone(3000.0, rate, 44100);

        let mut on = ChannelFilter::new(1000.0, 80.0, rate, decim);
        let out_on = on.process(&input_on);
        let mut off = ChannelFilter::new(1000.0, 80.0, rate, decim);
        let out_off = off.process(&input_off);

        // Skip the filter fill-up
        let settled = on.num_taps() / decim + 1;
        let level_on = mean_level(&out_on[settled..]);
        let level_off = mean_level(&out_off[settled..]);
        assert!((level_on - 1.0).abs() < 0.05, "on-carrier level {}", level_on);
        assert!(level_off < 0.05, "off-carrier level {}", level_off);
    }
}
