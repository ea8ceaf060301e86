//! Streaming pipeline plumbing: the [`Backend`] seam the control loop drives,
//! the [`MutationQueue`] that batches topology changes, and [`Flowgraph`], an
//! in-process backend running on its own worker thread.

pub mod block;
pub mod chain;
pub mod flowgraph;
pub mod queue;

use std::fmt;

pub use chain::{ChainTap, DemodChain, Decoder, DecoderFactory};
pub use flowgraph::{Flowgraph, FlowgraphConfig};
pub use queue::{Directive, FlushReport, MutationQueue};

/// Handle to a block in the pipeline. Ids are never reused, so a handle to a
/// released block fails cleanly instead of aliasing a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("pipeline is not running")]
    NotRunning,
    #[error("topology change attempted outside a pause")]
    NotPaused,
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("{0} -> {1} is already connected")]
    AlreadyConnected(NodeId, NodeId),
    #[error("{0} -> {1} is not connected")]
    NotConnected(NodeId, NodeId),
    #[error("input of {0} is already fed by {1}")]
    InputBusy(NodeId, NodeId),
    #[error("{0} -> {1} would form a cycle or feed the source")]
    InvalidEdge(NodeId, NodeId),
    #[error("node {0} is still connected")]
    NodeInUse(NodeId),
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
}

/// Parameters of a frequency-translating, band-limiting channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSpec {
    /// Carrier offset from the source centre, Hz
    pub carrier_freq: f64,
    /// Lowpass cutoff, Hz
    pub bandwidth: f64,
    /// Keep one output sample per `decimation` inputs
    pub decimation: usize,
}

/// What a demodulation chain is built for.
#[derive(Debug, Clone, PartialEq)]
pub struct DemodProfile {
    pub name: &'static str,
    /// Channel bandwidth, Hz
    pub bandwidth: f64,
    /// Symbol rate, baud
    pub symbol_rate: f64,
}

/// The streaming backend as seen by the control loop.
///
/// `connect`, `disconnect` and `release` are only safe between `pause` and
/// `resume`; implementations reject them otherwise. Creating blocks is safe at
/// any time because a new block is not wired into the live graph.
pub trait Backend {
    /// Whether the streaming thread is alive
    fn is_running(&self) -> bool;

    /// Latest detection spectrum (squared magnitudes), if one has been produced
    fn spectrum(&self) -> Option<Vec<f32>>;

    /// Block that emits the source samples
    fn source_node(&self) -> NodeId;

    /// Sample rate of the source, Hz
    fn source_sample_rate(&self) -> f64;

    /// Register an unwired channel block
    fn add_channel(&mut self, spec: &ChannelSpec) -> Result<NodeId, GraphError>;

    /// Register an unwired demodulation chain expecting `sample_rate`
    fn add_demod_chain(
        &mut self,
        profile: &DemodProfile,
        sample_rate: f64,
    ) -> Result<DemodChain, GraphError>;

    /// Block until the streaming thread is parked between buffers
    fn pause(&mut self) -> Result<(), GraphError>;

    /// Let the streaming thread continue
    fn resume(&mut self);

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError>;

    fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError>;

    /// Drop an unconnected block
    fn release(&mut self, node: NodeId) -> Result<(), GraphError>;
}
