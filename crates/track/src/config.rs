use serde::{Deserialize, Serialize};
use skim_graph::FlowgraphConfig;

use crate::signal::SignalKind;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("fft_width must be at least 2, got {0}")]
    FftWidth(usize),
    #[error("keep_one_in must be at least 1")]
    KeepOneIn,
    #[error("tolerance_hz must be positive, got {0}")]
    Tolerance(f64),
    #[error("cutoff must be finite and non-negative, got {0}")]
    Cutoff(f64),
}

/// Detection and tracking settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detection FFT width, bins
    pub fft_width: usize,
    /// Detect on one FFT vector in this many
    pub keep_one_in: usize,
    /// Peak sharpness threshold, scaled by the FFT width
    pub cutoff: f64,
    /// Peaks closer than this to a tracked carrier belong to it, Hz
    pub tolerance_hz: f64,
    /// Missed scans tolerated before a signal goes inactive
    pub silence_threshold: u32,
    /// Drop inactive signals with no text this many scans after they went
    /// inactive. `None` keeps them forever.
    pub evict_after: Option<u32>,
    pub kind: SignalKind,
    /// Added to carrier offsets for display, Hz
    pub center_freq: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fft_width: 1000,
            keep_one_in: 128,
            cutoff: 100.0,
            tolerance_hz: 50.0,
            silence_threshold: 5,
            evict_after: None,
            kind: SignalKind::Psk31,
            center_freq: 0.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_width < 2 {
            return Err(ConfigError::FftWidth(self.fft_width));
        }
        if self.keep_one_in == 0 {
            return Err(ConfigError::KeepOneIn);
        }
        if !(self.tolerance_hz > 0.0) {
            return Err(ConfigError::Tolerance(self.tolerance_hz));
        }
        if !(self.cutoff.is_finite() && self.cutoff >= 0.0) {
            return Err(ConfigError::Cutoff(self.cutoff));
        }
        Ok(())
    }

    /// Backend settings matching the detector's expectations
    pub fn flowgraph_config(&self) -> FlowgraphConfig {
        FlowgraphConfig {
            fft_width: self.fft_width,
            keep_one_in: self.keep_one_in,
            ..FlowgraphConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.fft_width, 1000);
        assert_eq!(config.silence_threshold, 5);
        assert_eq!(config.evict_after, None);
        assert!(config.validate().is_ok());
        assert_eq!(config.flowgraph_config().keep_one_in, 128);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"tolerance_hz": 20.0, "evict_after": 30, "kind": "psk31"}"#)
                .unwrap();
        assert_eq!(config.tolerance_hz, 20.0);
        assert_eq!(config.evict_after, Some(30));
        assert_eq!(config.cutoff, 100.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrackerConfig {
            fft_width: 1,
            ..TrackerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::FftWidth(1)));
        config.fft_width = 1000;
        config.tolerance_hz = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::Tolerance(0.0)));
        config.tolerance_hz = 50.0;
        config.cutoff = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Cutoff(_))));
    }
}
