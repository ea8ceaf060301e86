use std::collections::HashMap;

use skim_dsp::decimation_for;
use skim_graph::{Backend, ChannelSpec, GraphError, MutationQueue, NodeId};

use crate::signal::{ChannelHandle, Signal, SignalId};

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("no integer decimation fits {bandwidth} Hz at {sample_rate} Hz")]
    ZeroDecimation { bandwidth: f64, sample_rate: f64 },
    #[error(transparent)]
    Backend(#[from] GraphError),
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    channel: NodeId,
    chain: NodeId,
    output_rate: f64,
    wired: bool,
}

/// What one [`Channelizer::apply`] queued.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub connected: Vec<SignalId>,
    pub disconnected: Vec<SignalId>,
    /// Signals marked unreachable by this pass
    pub failed: Vec<SignalId>,
}

/// Keeps each signal's channel wired exactly while the signal is active.
///
/// Channel and chain blocks are created on the backend directly since they
/// start unwired; every edge change goes through the mutation queue.
/// Allocations outlive deactivation so a returning carrier reuses its
/// channel.
#[derive(Debug, Default)]
pub struct Channelizer {
    allocations: HashMap<SignalId, Allocation>,
}

impl Channelizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_wired(&self, id: SignalId) -> bool {
        self.allocations.get(&id).map_or(false, |a| a.wired)
    }

    /// Channel block cached for a signal
    pub fn channel_of(&self, id: SignalId) -> Option<NodeId> {
        self.allocations.get(&id).map(|a| a.channel)
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// Queue the wiring changes that bring the backend in line with each
    /// signal's `active` flag.
    pub fn apply<B: Backend + ?Sized>(
        &mut self,
        signals: &mut [Signal],
        backend: &mut B,
        queue: &mut MutationQueue,
    ) -> ApplyReport {
        let source = backend.source_node();
        let mut report = ApplyReport::default();

        for signal in signals.iter_mut() {
            if signal.active {
                if signal.unreachable || self.is_wired(signal.id) {
                    continue;
                }
                if !self.allocations.contains_key(&signal.id) {
                    match allocate(signal, backend, queue) {
                        Ok(alloc) => {
                            self.allocations.insert(signal.id, alloc);
                        }
                        Err(e) => {
                            log::error!(
                                "{} at {:.1} Hz is unreachable: {}",
                                signal.id,
                                signal.carrier_freq,
                                e
                            );
                            signal.unreachable = true;
                            report.failed.push(signal.id);
                            continue;
                        }
                    }
                }
                let Some(alloc) = self.allocations.get_mut(&signal.id) else {
                    continue;
                };

                queue.connect(source, alloc.channel);
                queue.connect(alloc.channel, alloc.chain);
                alloc.wired = true;
                signal.channel_handle = Some(ChannelHandle {
                    channel: alloc.channel,
                    output_rate: alloc.output_rate,
                });
                log::debug!("wiring {} at {:.1} Hz", signal.id, signal.carrier_freq);
                report.connected.push(signal.id);
            } else if let Some(alloc) = self.allocations.get_mut(&signal.id) {
                if !alloc.wired {
                    continue;
                }
                queue.disconnect(source, alloc.channel);
                queue.disconnect(alloc.channel, alloc.chain);
                alloc.wired = false;
                signal.channel_handle = None;
                log::debug!("unwiring {} at {:.1} Hz", signal.id, signal.carrier_freq);
                report.disconnected.push(signal.id);
            }
        }

        report
    }

    /// Forget a signal that left the tracked set, unwiring and releasing its
    /// blocks. Returns false if it had no allocation.
    pub fn release(&mut self, id: SignalId, source: NodeId, queue: &mut MutationQueue) -> bool {
        let Some(alloc) = self.allocations.remove(&id) else {
            return false;
        };
        if alloc.wired {
            queue.disconnect(source, alloc.channel);
            queue.disconnect(alloc.channel, alloc.chain);
        }
        queue.release(alloc.channel);
        queue.release(alloc.chain);
        log::debug!("releasing channel of {}", id);
        true
    }
}

/// Register an unwired channel for `signal`, and its chain if it has none
/// yet, then bring the signal to the channel's output rate.
fn allocate<B: Backend + ?Sized>(
    signal: &mut Signal,
    backend: &mut B,
    queue: &mut MutationQueue,
) -> Result<Allocation, AllocationError> {
    let sample_rate = backend.source_sample_rate();
    let decimation = decimation_for(sample_rate, signal.bandwidth);
    if decimation == 0 {
        return Err(AllocationError::ZeroDecimation {
            bandwidth: signal.bandwidth,
            sample_rate,
        });
    }

    let spec = ChannelSpec {
        carrier_freq: signal.carrier_freq,
        bandwidth: signal.bandwidth,
        decimation,
    };
    let channel = backend.add_channel(&spec)?;
    let output_rate = sample_rate / decimation as f64;

    let chain = match &signal.chain {
        Some(chain) => chain.node(),
        None => match backend.add_demod_chain(&signal.kind.profile(), output_rate) {
            Ok(chain) => {
                let node = chain.node();
                signal.attach_chain(chain);
                node
            }
            Err(e) => {
                queue.release(channel);
                return Err(e.into());
            }
        },
    };
    signal.set_sample_rate(output_rate);

    log::debug!(
        "allocated channel {} for {} (decimation {}, {:.2} Hz)",
        channel,
        signal.id,
        decimation,
        output_rate
    );
    Ok(Allocation {
        channel,
        chain,
        output_rate,
        wired: false,
    })
}
