use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use skim_graph::{Flowgraph, GraphError};
use skim_sdr::SdrSource;
use skim_track::{CycleReport, Scanner, TrackerConfig};

use crate::render::Renderer;

pub struct RunOptions {
    /// Control loop period
    pub interval: Duration,
    /// Stop after this long; `None` runs until the source ends
    pub duration: Option<Duration>,
}

/// Stream `source` through the flowgraph and run the control loop until the
/// source ends or the duration elapses.
pub fn run(source: Box<dyn SdrSource>, config: &TrackerConfig, options: &RunOptions) -> Result<()> {
    let sample_rate = source.sample_rate() as f64;
    let mut graph = Flowgraph::start(source, config.flowgraph_config());
    let mut scanner = Scanner::new(config, sample_rate);
    let mut renderer = Renderer::new(config.center_freq);
    let mut out = io::stdout().lock();

    log::info!(
        "tracking {} carriers (cutoff {}, tolerance {} Hz, silence threshold {})",
        config.kind,
        config.cutoff,
        config.tolerance_hz,
        config.silence_threshold
    );

    let start = Instant::now();
    let mut next_tick = start + options.interval;
    let mut cycles: u64 = 0;

    loop {
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        }
        next_tick += options.interval;

        match scanner.tick(&mut graph) {
            Ok(report) => {
                cycles += 1;
                log_cycle(cycles, &report);
                renderer.update(&mut out, scanner.views())?;
            }
            Err(GraphError::NotRunning) => {
                log::info!("pipeline stopped after {} cycles", cycles);
                break;
            }
            Err(e) => return Err(e.into()),
        }

        if options.duration.map_or(false, |d| start.elapsed() >= d) {
            log::info!("duration reached after {} cycles", cycles);
            break;
        }
    }

    scanner.shutdown();
    graph.stop();

    // Text decoded up to the halt is still queued in the chains
    scanner.drain_messages();
    renderer.update(&mut out, scanner.views())?;
    renderer.summary(&mut out, scanner.views())?;
    Ok(())
}

fn log_cycle(cycle: u64, report: &CycleReport) {
    let Some(peaks) = &report.peaks else {
        log::debug!("cycle {}: no spectrum yet", cycle);
        return;
    };
    if report.scan.is_quiet() && report.flush.applied + report.flush.failed == 0 {
        log::trace!("cycle {}: {} peaks, no changes", cycle, peaks.len());
        return;
    }
    log::debug!(
        "cycle {}: {} peaks, +{} new, {} back, {} gone, {} evicted, {} directives ({} failed)",
        cycle,
        peaks.len(),
        report.scan.created.len(),
        report.scan.reactivated.len(),
        report.scan.deactivated.len(),
        report.scan.evicted.len(),
        report.flush.applied + report.flush.failed,
        report.flush.failed
    );
    if !report.apply.failed.is_empty() {
        log::warn!("{} carriers could not be channelized", report.apply.failed.len());
    }
}
