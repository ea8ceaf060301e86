//! Carrier detection and tracking: turns periodic spectra into a live set of
//! [`Signal`]s and keeps one channel wired into the backend per active
//! signal.

pub mod channelizer;
pub mod config;
pub mod factory;
pub mod scanner;
pub mod signal;
pub mod tracker;

pub use channelizer::{AllocationError, ApplyReport, Channelizer};
pub use config::{ConfigError, TrackerConfig};
pub use factory::{factory_for, Psk31Factory, SignalFactory};
pub use scanner::{CycleReport, Scanner};
pub use signal::{ChannelHandle, Signal, SignalId, SignalKind, SignalView};
pub use tracker::{ScanReport, SignalTracker};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeSet;

    use skim_graph::{
        Backend, ChainTap, ChannelSpec, DemodChain, DemodProfile, GraphError, NodeId,
    };

    /// Backend that keeps edges in a set and never streams.
    pub struct FakeBackend {
        pub running: bool,
        pub paused: bool,
        pub sample_rate: f64,
        pub spectrum: Option<Vec<f32>>,
        pub source: NodeId,
        pub nodes: BTreeSet<NodeId>,
        pub edges: BTreeSet<(NodeId, NodeId)>,
        pub channels: Vec<ChannelSpec>,
        pub taps: Vec<ChainTap>,
        pub reject_channels: bool,
        next_id: usize,
    }

    impl FakeBackend {
        pub fn new(sample_rate: f64) -> Self {
            let source = NodeId(0);
            Self {
                running: true,
                paused: false,
                sample_rate,
                spectrum: None,
                source,
                nodes: BTreeSet::from([source]),
                edges: BTreeSet::new(),
                channels: Vec::new(),
                taps: Vec::new(),
                reject_channels: false,
                next_id: 1,
            }
        }

        fn alloc_id(&mut self) -> NodeId {
            let id = NodeId(self.next_id);
            self.next_id += 1;
            self.nodes.insert(id);
            id
        }

        fn check(&self, node: NodeId) -> Result<(), GraphError> {
            assert!(self.paused, "topology change outside pause");
            if self.nodes.contains(&node) {
                Ok(())
            } else {
                Err(GraphError::UnknownNode(node))
            }
        }
    }

    impl Backend for FakeBackend {
        fn is_running(&self) -> bool {
            self.running
        }

        fn spectrum(&self) -> Option<Vec<f32>> {
            self.spectrum.clone()
        }

        fn source_node(&self) -> NodeId {
            self.source
        }

        fn source_sample_rate(&self) -> f64 {
            self.sample_rate
        }

        fn add_channel(&mut self, spec: &ChannelSpec) -> Result<NodeId, GraphError> {
            if self.reject_channels {
                return Err(GraphError::InvalidChannel("rejected".into()));
            }
            self.channels.push(*spec);
            Ok(self.alloc_id())
        }

        fn add_demod_chain(
            &mut self,
            _profile: &DemodProfile,
            sample_rate: f64,
        ) -> Result<DemodChain, GraphError> {
            let id = self.alloc_id();
            let (chain, tap) = DemodChain::new(id, sample_rate);
            self.taps.push(tap);
            Ok(chain)
        }

        fn pause(&mut self) -> Result<(), GraphError> {
            if !self.running {
                return Err(GraphError::NotRunning);
            }
            self.paused = true;
            Ok(())
        }

        fn resume(&mut self) {
            self.paused = false;
        }

        fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
            self.check(from)?;
            self.check(to)?;
            if !self.edges.insert((from, to)) {
                return Err(GraphError::AlreadyConnected(from, to));
            }
            Ok(())
        }

        fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
            self.check(from)?;
            self.check(to)?;
            if !self.edges.remove(&(from, to)) {
                return Err(GraphError::NotConnected(from, to));
            }
            Ok(())
        }

        fn release(&mut self, node: NodeId) -> Result<(), GraphError> {
            self.check(node)?;
            if node == self.source || self.edges.iter().any(|&(a, b)| a == node || b == node) {
                return Err(GraphError::NodeInUse(node));
            }
            self.nodes.remove(&node);
            Ok(())
        }
    }
}
