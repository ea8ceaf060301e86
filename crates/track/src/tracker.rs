use crate::config::TrackerConfig;
use crate::factory::SignalFactory;
use crate::signal::{Signal, SignalId, SignalView};

/// What one [`SignalTracker::scan`] changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub created: Vec<SignalId>,
    pub reactivated: Vec<SignalId>,
    pub deactivated: Vec<SignalId>,
    pub evicted: Vec<SignalId>,
}

impl ScanReport {
    pub fn is_quiet(&self) -> bool {
        self.created.is_empty()
            && self.reactivated.is_empty()
            && self.deactivated.is_empty()
            && self.evicted.is_empty()
    }
}

/// Matches detected carrier frequencies against the tracked set.
///
/// Matching is greedy: each frequency belongs to the first tracked signal
/// (in insertion order) within `tolerance_hz`, even when a later one is
/// closer. A signal goes inactive once it has been missed more than
/// `silence_threshold` scans in a row and comes back on its next match.
pub struct SignalTracker {
    signals: Vec<Signal>,
    factory: Box<dyn SignalFactory>,
    tolerance_hz: f64,
    silence_threshold: u32,
    evict_after: Option<u32>,
}

impl SignalTracker {
    pub fn new(factory: Box<dyn SignalFactory>, config: &TrackerConfig) -> Self {
        Self {
            signals: Vec::new(),
            factory,
            tolerance_hz: config.tolerance_hz,
            silence_threshold: config.silence_threshold,
            evict_after: config.evict_after,
        }
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut [Signal] {
        &mut self.signals
    }

    pub fn get(&self, id: SignalId) -> Option<&Signal> {
        self.signals.iter().find(|s| s.id == id)
    }

    pub fn views(&self) -> impl Iterator<Item = SignalView<'_>> {
        self.signals.iter().map(Signal::view)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Fold one detection pass into the tracked set. Existing signals keep
    /// their order; new ones are appended in detection order.
    pub fn scan(&mut self, detected: &[f64]) -> ScanReport {
        let mut report = ScanReport::default();
        let mut matched = vec![false; self.signals.len()];
        let mut unmatched = Vec::new();

        for &freq in detected.iter().filter(|f| f.is_finite()) {
            let hit = self
                .signals
                .iter()
                .position(|s| (freq - s.carrier_freq).abs() < self.tolerance_hz);
            match hit {
                Some(i) => matched[i] = true,
                None => unmatched.push(freq),
            }
        }

        for (signal, hit) in self.signals.iter_mut().zip(matched) {
            if hit {
                signal.consecutive_silences = 0;
                if !signal.active {
                    log::debug!("reactivating {} at {:.1} Hz", signal.id, signal.carrier_freq);
                    signal.active = true;
                    report.reactivated.push(signal.id);
                }
            } else {
                signal.consecutive_silences = signal.consecutive_silences.saturating_add(1);
                if signal.active && signal.consecutive_silences > self.silence_threshold {
                    log::debug!("deactivating {} at {:.1} Hz", signal.id, signal.carrier_freq);
                    signal.active = false;
                    report.deactivated.push(signal.id);
                }
            }
        }

        if let Some(extra) = self.evict_after {
            let limit = self.silence_threshold.saturating_add(extra);
            self.signals.retain(|s| {
                let evict = !s.active && s.decoded_text.is_empty() && s.consecutive_silences > limit;
                if evict {
                    log::debug!("evicting {} at {:.1} Hz", s.id, s.carrier_freq);
                    report.evicted.push(s.id);
                }
                !evict
            });
        }

        for freq in unmatched {
            let signal = self.factory.create(freq);
            log::debug!("new {} signal {} at {:.1} Hz", signal.kind, signal.id, freq);
            report.created.push(signal.id);
            self.signals.push(signal);
        }

        report
    }
}
