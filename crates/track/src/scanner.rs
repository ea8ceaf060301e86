use skim_dsp::PeakDetector;
use skim_graph::{Backend, FlushReport, GraphError, MutationQueue};

use crate::channelizer::{ApplyReport, Channelizer};
use crate::config::TrackerConfig;
use crate::factory::{factory_for, SignalFactory};
use crate::signal::{Signal, SignalView};
use crate::tracker::{ScanReport, SignalTracker};

/// Everything one control cycle did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    /// `None` when the backend had no spectrum yet and tracking was skipped
    pub peaks: Option<Vec<f64>>,
    pub scan: ScanReport,
    pub apply: ApplyReport,
    pub flush: FlushReport,
}

/// The detection, tracking and channelization loop for one backend.
///
/// Each [`tick`](Scanner::tick) drains decoded text, reads the latest
/// spectrum, updates the tracked set, queues the wiring changes and flushes
/// them in one pause.
pub struct Scanner {
    detector: PeakDetector,
    tracker: SignalTracker,
    channelizer: Channelizer,
    queue: MutationQueue,
    sample_rate: f64,
    cutoff: f64,
    center_freq: f64,
}

impl Scanner {
    pub fn new(config: &TrackerConfig, sample_rate: f64) -> Self {
        Self::with_factory(config, sample_rate, factory_for(config.kind, sample_rate))
    }

    pub fn with_factory(
        config: &TrackerConfig,
        sample_rate: f64,
        factory: Box<dyn SignalFactory>,
    ) -> Self {
        Self {
            detector: PeakDetector::new(),
            tracker: SignalTracker::new(factory, config),
            channelizer: Channelizer::new(),
            queue: MutationQueue::new(),
            sample_rate,
            cutoff: config.cutoff,
            center_freq: config.center_freq,
        }
    }

    /// Run one cycle. Fails only when the backend has stopped; the pending
    /// directives are then kept so the caller decides what to do with them.
    pub fn tick<B: Backend + ?Sized>(&mut self, backend: &mut B) -> Result<CycleReport, GraphError> {
        self.drain_messages();

        let mut report = CycleReport::default();
        if let Some(spectrum) = backend.spectrum() {
            let peaks = self
                .detector
                .detect_peaks(&spectrum, self.sample_rate, self.cutoff);
            report.scan = self.tracker.scan(&peaks);
            report.peaks = Some(peaks);
        }

        let source = backend.source_node();
        for &id in &report.scan.evicted {
            self.channelizer.release(id, source, &mut self.queue);
        }
        report.apply = self
            .channelizer
            .apply(self.tracker.signals_mut(), backend, &mut self.queue);
        report.flush = self.queue.flush(backend)?;

        Ok(report)
    }

    /// Pull decoded bytes from every chain into the signals' text
    pub fn drain_messages(&mut self) {
        for signal in self.tracker.signals_mut() {
            signal.get_message();
        }
    }

    /// Drop directives that were never flushed
    pub fn shutdown(&mut self) {
        if !self.queue.is_empty() {
            log::debug!("dropping {} pending directives", self.queue.len());
        }
        self.queue.clear();
    }

    pub fn signals(&self) -> &[Signal] {
        self.tracker.signals()
    }

    pub fn views(&self) -> impl Iterator<Item = SignalView<'_>> {
        self.tracker.views()
    }

    pub fn center_freq(&self) -> f64 {
        self.center_freq
    }

    pub fn pending_directives(&self) -> usize {
        self.queue.len()
    }
}
