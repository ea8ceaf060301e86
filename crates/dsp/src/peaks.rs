//! Carrier peak extraction from a magnitude spectrum.
//!
//! Peaks are zero crossings (positive to negative) of the smoothed first
//! derivative of the spectrum. The smoothing lowpass keeps small local
//! wiggles from being reported; the crossing's slope is compared against
//! a cutoff to reject shallow peaks. Both filters treat the spectrum as
//! circular, so carriers in the first and last bins are found like any other.

use crate::window;

/// Central-difference taps approximating the first derivative.
pub const DIFF_TAPS: [f64; 3] = [-0.5, 0.0, 0.5];

/// Smoothing filter, in cycles per bin.
const SMOOTH_CUTOFF: f64 = 0.08;
const SMOOTH_TRANSITION: f64 = 0.04;
const SMOOTH_ATTENUATION_DB: f64 = 20.0;

/// Peak detector with precomputed smoothing taps.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    smooth_taps: Vec<f64>,
    offset: f64,
}

impl PeakDetector {
    pub fn new() -> Self {
        let smooth_taps = window::lowpass(SMOOTH_CUTOFF, SMOOTH_TRANSITION, SMOOTH_ATTENUATION_DB);
        // Combined group delay of the two causal filters, in bins.
        let offset = (DIFF_TAPS.len() + smooth_taps.len()) as f64 / 2.0 - 0.5;
        Self { smooth_taps, offset }
    }

    /// Delay (in bins) compensated when converting a crossing to a frequency.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn smooth_taps(&self) -> &[f64] {
        &self.smooth_taps
    }

    /// Estimate carrier frequencies (Hz) from a spectrum of `N` bins.
    ///
    /// Bin `k` is taken to hold frequency `k * sample_rate / N`; results above
    /// `sample_rate / 2` are wrapped to negative offsets. `cutoff` is divided by
    /// `N` to give the minimum slope drop across the crossing.
    ///
    /// An empty, non-finite, flat or all-zero spectrum yields no peaks.
    pub fn detect_peaks(&self, spectrum: &[f32], sample_rate: f64, cutoff: f64) -> Vec<f64> {
        let n = spectrum.len();
        if n < 2 || !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Vec::new();
        }
        if spectrum.iter().any(|v| !v.is_finite()) {
            return Vec::new();
        }

        let data: Vec<f64> = spectrum.iter().map(|&v| v as f64).collect();
        let deriv = convolve(&data, &DIFF_TAPS);
        let smoothed = convolve(&deriv, &self.smooth_taps);

        let threshold = cutoff / n as f64;
        let mut peaks = Vec::new();

        // The spectrum is circular: a crossing may span the last and first
        // bins. A run of exact zeros between a positive and a negative
        // sample is one crossing, centred on the run.
        for i in 0..n {
            if smoothed[i] <= 0.0 {
                continue;
            }
            let mut span = 1;
            while span < n && smoothed[(i + span) % n] == 0.0 {
                span += 1;
            }
            let next = smoothed[(i + span) % n];
            if next >= 0.0 {
                continue;
            }
            let total_drop = smoothed[i] - next;
            if total_drop / span as f64 > threshold {
                let x = if span == 1 {
                    i as f64 + smoothed[i] / total_drop
                } else {
                    i as f64 + span as f64 / 2.0
                };
                peaks.push(self.bin_to_freq(x, n, sample_rate));
            }
        }

        peaks
    }

    fn bin_to_freq(&self, x: f64, n: usize, sample_rate: f64) -> f64 {
        let bin = (x + 0.5 - self.offset).rem_euclid(n as f64);
        let mut f = bin * sample_rate / n as f64;
        if f > sample_rate / 2.0 {
            f -= sample_rate;
        }
        f
    }
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot convenience wrapper around [`PeakDetector::detect_peaks`].
pub fn detect_peaks(spectrum: &[f32], sample_rate: f64, cutoff: f64) -> Vec<f64> {
    PeakDetector::new().detect_peaks(spectrum, sample_rate, cutoff)
}

/// Circular FIR: `out[i] = sum_j taps[j] * x[(i + j - (L - 1)) mod N]`.
fn convolve(data: &[f64], taps: &[f64]) -> Vec<f64> {
    if data.is_empty() || taps.is_empty() {
        return data.to_vec();
    }
    let n = data.len() as isize;
    let pad = taps.len() as isize - 1;

    (0..n)
        .map(|i| {
            taps.iter()
                .enumerate()
                .map(|(j, t)| t * data[(i + j as isize - pad).rem_euclid(n) as usize])
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(n: usize, center: f64, sigma: f64, amplitude: f64) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let d = i as f64 - center;
                (amplitude * (-d * d / (2.0 * sigma * sigma)).exp()) as f32
            })
            .collect()
    }

    #[test]
    fn test_offset() {
        let det = PeakDetector::new();
        assert_eq!(det.smooth_taps().len(), 23);
        assert!((det.offset() - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_convolve_wraps_around() {
        let data = [1.0, 1.0, 3.0, 5.0, 5.0];
        let d = convolve(&data, &DIFF_TAPS);
        assert_eq!(d, vec![-2.0, -2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_single_sharp_peak() {
        let n = 256;
        let sample_rate = 44100.0;
        let k = 40;
        let mut spectrum = vec![1.0f32; n];
        spectrum[k] = 50.0;

        let peaks = detect_peaks(&spectrum, sample_rate, 100.0);
        assert_eq!(peaks.len(), 1, "peaks: {:?}", peaks);
        let expected = k as f64 * sample_rate / n as f64;
        let bin_width = sample_rate / n as f64;
        assert!(
            (peaks[0] - expected).abs() < bin_width,
            "got {}, expected {}",
            peaks[0],
            expected
        );
    }

    #[test]
    fn test_peak_wraps_to_negative() {
        let n = 1000;
        let sample_rate = 44100.0;
        let mut spectrum = vec![0.0f32; n];
        spectrum[900] = 100.0;

        let peaks = detect_peaks(&spectrum, sample_rate, 100.0);
        assert_eq!(peaks.len(), 1, "peaks: {:?}", peaks);
        let expected = 900.0 * sample_rate / n as f64 - sample_rate;
        assert!((peaks[0] - expected).abs() < 44.1, "got {}", peaks[0]);
        assert!(peaks[0] < 0.0);
    }

    #[test]
    fn test_spike_found_in_every_bin() {
        let n = 1000;
        let sample_rate = 44100.0;
        let bin_width = sample_rate / n as f64;
        let det = PeakDetector::new();

        for k in 0..n {
            let mut spectrum = vec![0.0f32; n];
            spectrum[k] = 100.0;

            let peaks = det.detect_peaks(&spectrum, sample_rate, 100.0);
            assert_eq!(peaks.len(), 1, "bin {}: {:?}", k, peaks);
            assert!(peaks[0].abs() <= sample_rate / 2.0, "bin {}: {}", k, peaks[0]);
            let d = (peaks[0] - k as f64 * bin_width).rem_euclid(sample_rate);
            assert!(
                d.min(sample_rate - d) < bin_width,
                "bin {}: got {}",
                k,
                peaks[0]
            );
        }
    }

    #[test]
    fn test_flat_spectrum_has_no_peaks() {
        for &level in &[0.0f32, 1.0, 3.5, 1e6] {
            let spectrum = vec![level; 500];
            for &cutoff in &[0.0, 1.0, 100.0] {
                assert!(
                    detect_peaks(&spectrum, 44100.0, cutoff).is_empty(),
                    "level {} cutoff {}",
                    level,
                    cutoff
                );
            }
        }
    }

    #[test]
    fn test_empty_and_malformed_spectrum() {
        assert!(detect_peaks(&[], 44100.0, 100.0).is_empty());
        assert!(detect_peaks(&[5.0], 44100.0, 100.0).is_empty());
        let mut spectrum = vec![0.0f32; 100];
        spectrum[50] = f32::NAN;
        assert!(detect_peaks(&spectrum, 44100.0, 100.0).is_empty());
        let mut spectrum = vec![0.0f32; 100];
        spectrum[50] = 10.0;
        assert!(detect_peaks(&spectrum, 0.0, 1.0).is_empty());
    }

    #[test]
    fn test_gaussian_peak_near_1khz() {
        // 1000 bins at 44.1 kHz: 1 kHz sits at bin 22.68
        let n = 1000;
        let sample_rate = 44100.0;
        let center = 1000.0 * n as f64 / sample_rate;
        let spectrum = gaussian(n, center, 1.5, 1000.0);

        let peaks = detect_peaks(&spectrum, sample_rate, 100.0);
        assert_eq!(peaks.len(), 1, "peaks: {:?}", peaks);
        assert!((peaks[0] - 1000.0).abs() < 50.0, "got {}", peaks[0]);
    }

    #[test]
    fn test_two_peaks_in_order() {
        let n = 1000;
        let mut spectrum = vec![0.0f32; n];
        spectrum[100] = 100.0;
        spectrum[300] = 100.0;

        let peaks = detect_peaks(&spectrum, 8000.0, 100.0);
        assert_eq!(peaks.len(), 2, "peaks: {:?}", peaks);
        assert!((peaks[0] - 800.0).abs() < 8.0);
        assert!((peaks[1] - 2400.0).abs() < 8.0);
    }

    #[test]
    fn test_cutoff_rejects_weak_peak() {
        let n = 1000;
        let mut spectrum = vec![0.0f32; n];
        spectrum[100] = 0.5;

        assert!(detect_peaks(&spectrum, 8000.0, 100.0).is_empty());
        let peaks = detect_peaks(&spectrum, 8000.0, 1.0);
        assert_eq!(peaks.len(), 1);
    }

    #[test]
    fn test_deterministic() {
        let spectrum = gaussian(512, 123.4, 2.0, 500.0);
        let det = PeakDetector::new();
        let a = det.detect_peaks(&spectrum, 48000.0, 50.0);
        let b = det.detect_peaks(&spectrum, 48000.0, 50.0);
        assert_eq!(a, b);
    }
}
