use std::f64::consts::PI;

/// Generate Hamming window coefficients
pub fn hamming(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
        .collect()
}

/// Generate 4-term Blackman-Harris window coefficients (92 dB sidelobes).
/// Used ahead of the detection FFT so weak carriers next to strong ones
/// are not buried in leakage.
pub fn blackman_harris(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / denom;
            (A0 - A1 * x.cos() + A2 * (2.0 * x).cos() - A3 * (3.0 * x).cos()) as f32
        })
        .collect()
}

/// Tap count for a windowed-sinc design, following GNU Radio's
/// `firdes::low_pass_2` estimate. Always odd so the filter has an integer
/// group delay.
///
/// `transition` is in the same normalized units as the cutoff
/// (cycles per sample, or cycles per bin for spectrum smoothing).
pub fn windowed_ntaps(transition: f64, attenuation_db: f64) -> usize {
    let ntaps = (attenuation_db / (22.0 * transition)) as usize;
    if ntaps % 2 == 0 {
        ntaps + 1
    } else {
        ntaps
    }
}

/// Design a Hamming-windowed sinc lowpass filter with unity DC gain.
///
/// - `cutoff`: normalized cutoff frequency (cycles per sample, 0..0.5)
/// - `transition`: normalized transition width, sets the tap count
/// - `attenuation_db`: stopband attenuation used for the tap count estimate
///
/// The taps are mirrored from one computed half so the response is exactly
/// symmetric.
pub fn lowpass(cutoff: f64, transition: f64, attenuation_db: f64) -> Vec<f64> {
    let ntaps = windowed_ntaps(transition, attenuation_db).max(1);
    let half_len = (ntaps - 1) / 2;
    let win = hamming(ntaps);

    let mut half = Vec::with_capacity(half_len + 1);
    for k in 0..=half_len {
        let sinc_val = if k == 0 {
            2.0 * cutoff
        } else {
            let kf = k as f64;
            (2.0 * PI * cutoff * kf).sin() / (PI * kf)
        };
        half.push(sinc_val * win[half_len + k]);
    }

    let mut h = Vec::with_capacity(ntaps);
    for n in 0..ntaps {
        let k = if n < half_len { half_len - n } else { n - half_len };
        h.push(half[k]);
    }

    let sum: f64 = h.iter().sum();
    if sum.abs() > f64::EPSILON {
        for tap in h.iter_mut() {
            *tap /= sum;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_window() {
        let w = hamming(64);
        assert_eq!(w.len(), 64);
        for i in 0..32 {
            assert!(
                (w[i] - w[63 - i]).abs() < 1e-12,
                "asymmetry at index {}: {} != {}",
                i,
                w[i],
                w[63 - i]
            );
        }
        assert!((w[0] - 0.08).abs() < 1e-9);
        assert!(w[31] > 0.99);
    }

    #[test]
    fn test_blackman_harris_window() {
        let w = blackman_harris(256);
        assert_eq!(w.len(), 256);
        // Edges nearly zero, centre near one
        assert!(w[0] < 1e-3);
        assert!(w[255] < 1e-3);
        assert!(w[127] > 0.99);
    }

    #[test]
    fn test_ntaps_rule() {
        // 20 dB over a 0.04 transition: 20 / 0.88 = 22.7 -> 22 -> odd 23
        assert_eq!(windowed_ntaps(0.04, 20.0), 23);
        // 10 dB over 20 Hz at 44.1 kHz: 1002 -> 1003
        assert_eq!(windowed_ntaps(20.0 / 44100.0, 10.0), 1003);
    }

    #[test]
    fn test_lowpass_unity_gain_and_symmetry() {
        let h = lowpass(0.08, 0.04, 20.0);
        assert_eq!(h.len(), 23);
        let sum: f64 = h.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "DC gain {}", sum);
        for i in 0..h.len() / 2 {
            assert_eq!(h[i], h[h.len() - 1 - i], "asymmetry at {}", i);
        }
        // Peak at centre
        let center = h.len() / 2;
        assert!(h.iter().all(|&t| t <= h[center]));
    }
}
