use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::window;

/// Windowed forward FFT producing a squared-magnitude spectrum.
///
/// Bin `k` of the output holds the power at `k * sample_rate / size`;
/// bins above `size / 2` are negative frequencies, as the peak detector
/// expects.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for `size`-point transforms with a Blackman-Harris window.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            size,
            window: window::blackman_harris(size),
            buffer: vec![Complex32::new(0.0, 0.0); size],
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
        }
    }

    /// Transform exactly `size` samples and return `|X[k]|^2` per bin.
    pub fn power(&mut self, input: &[Complex32]) -> Vec<f32> {
        assert_eq!(
            input.len(),
            self.size,
            "input length {} != FFT size {}",
            input.len(),
            self.size
        );
        for ((dst, &src), &w) in self.buffer.iter_mut().zip(input).zip(&self.window) {
            *dst = src * w;
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        self.buffer.iter().map(|c| c.norm_sqr()).collect()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_bin(power: &[f32]) -> usize {
        let mut max_bin = 0;
        let mut max_val = 0.0f32;
        for (i, &val) in power.iter().enumerate() {
            if val > max_val {
                max_val = val;
                max_bin = i;
            }
        }
        max_bin
    }

    #[test]
    fn test_fft_dc() {
        let size = 64;
        let mut analyzer = SpectrumAnalyzer::new(size);
        let input = vec![Complex32::new(1.0, 0.0); size];
        let power = analyzer.power(&input);
        assert_eq!(power.len(), size);
        assert_eq!(peak_bin(&power), 0);
    }

    #[test]
    fn test_fft_positive_and_negative_tone() {
        let size = 256;
        let mut analyzer = SpectrumAnalyzer::new(size);

        for &bin in &[20i32, -20] {
            let input: Vec<Complex32> = (0..size)
                .map(|n| {
                    let phase = 2.0 * std::f32::consts::PI * bin as f32 * n as f32 / size as f32;
                    Complex32::new(phase.cos(), phase.sin())
                })
                .collect();
            let power = analyzer.power(&input);
            let expected = bin.rem_euclid(size as i32) as usize;
            assert_eq!(peak_bin(&power), expected, "tone at bin {}", bin);
        }
    }
}
