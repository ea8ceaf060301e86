use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use num_complex::Complex32;
use skim_dsp::ChannelFilter;
use skim_sdr::{SampleBuf, SdrSource};

use crate::block::{Block, ChannelBlock, SharedSpectrum, SourceTap, SpectrumProbe};
use crate::chain::{DemodChain, DemodSink, DecoderFactory};
use crate::{Backend, ChannelSpec, DemodProfile, GraphError, NodeId};

/// How long the worker waits for a buffer before re-checking for a pause.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct FlowgraphConfig {
    /// Detection FFT width, bins
    pub fft_width: usize,
    /// Publish one detection spectrum per this many FFT vectors
    pub keep_one_in: usize,
    /// Source-to-worker buffer queue depth
    pub queue_depth: usize,
}

impl Default for FlowgraphConfig {
    fn default() -> Self {
        Self {
            fft_width: 1000,
            keep_one_in: 128,
            queue_depth: 64,
        }
    }
}

struct Node {
    block: Box<dyn Block>,
    input: Option<NodeId>,
    outputs: Vec<NodeId>,
}

/// Block storage. Released slots stay `None` so ids are never reused; the
/// table grows by one slot per block ever added, which the control loop
/// bounds to two per carrier it has wired.
struct Topology {
    nodes: Vec<Option<Node>>,
}

impl Topology {
    fn insert(&mut self, block: Box<dyn Block>) -> NodeId {
        self.nodes.push(Some(Node {
            block,
            input: None,
            outputs: Vec::new(),
        }));
        NodeId(self.nodes.len() - 1)
    }

    fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    fn get(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or(GraphError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or(GraphError::UnknownNode(id))
    }

    /// Record an edge. Callers have already validated both ends.
    fn link(&mut self, from: NodeId, to: NodeId) {
        if let Some(Some(node)) = self.nodes.get_mut(to.0) {
            node.input = Some(from);
        }
        if let Some(Some(node)) = self.nodes.get_mut(from.0) {
            node.outputs.push(to);
        }
    }

    fn unlink(&mut self, from: NodeId, to: NodeId) {
        if let Some(Some(node)) = self.nodes.get_mut(to.0) {
            node.input = None;
        }
        if let Some(Some(node)) = self.nodes.get_mut(from.0) {
            node.outputs.retain(|&o| o != to);
        }
    }

    /// True if `ancestor` feeds `node`, directly or through other blocks.
    fn is_upstream(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.get(id).ok().and_then(|n| n.input);
        }
        false
    }

    /// Push one buffer through `id` and everything downstream of it.
    fn run(&mut self, id: NodeId, input: &[Complex32]) {
        let (output, children) = match self.get_mut(id) {
            Ok(node) => (node.block.work(input), node.outputs.clone()),
            Err(_) => return,
        };
        if output.is_empty() {
            return;
        }
        for child in children {
            self.run(child, &output);
        }
    }
}

/// Pause handshake state between the control thread and the worker.
struct Control {
    running: bool,
    paused: bool,
    parked: bool,
}

struct Shared {
    control: Mutex<Control>,
    cond: Condvar,
    topology: Mutex<Topology>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process streaming backend.
///
/// A reader thread runs the [`SdrSource`]; a worker thread pushes every
/// buffer from the source block down the graph. The worker parks between
/// buffers while the control side holds a pause, so topology changes never
/// race a buffer in flight.
pub struct Flowgraph {
    shared: Arc<Shared>,
    source: NodeId,
    sample_rate: f64,
    spectrum: SharedSpectrum,
    decoder_factory: Option<DecoderFactory>,
    source_running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Flowgraph {
    /// Start streaming from `source`. The spectrum probe is wired to the
    /// source from the start; everything else is added by the control loop.
    pub fn start(mut source: Box<dyn SdrSource>, config: FlowgraphConfig) -> Self {
        let sample_rate = source.sample_rate() as f64;
        let center_freq = source.center_frequency();
        let source_running = source.running_flag();

        let mut topology = Topology { nodes: Vec::new() };
        let source_node = topology.insert(Box::new(SourceTap));
        let probe = SpectrumProbe::new(config.fft_width, config.keep_one_in);
        let spectrum = probe.shared();
        let probe_node = topology.insert(Box::new(probe));
        topology.link(source_node, probe_node);

        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                running: true,
                paused: false,
                parked: false,
            }),
            cond: Condvar::new(),
            topology: Mutex::new(topology),
        });

        let (tx, rx) = channel::bounded(config.queue_depth.max(1));

        let reader = std::thread::spawn(move || {
            if let Err(e) = source.start(tx) {
                log::error!("source error: {}", e);
            }
        });

        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            worker_loop(&worker_shared, rx, source_node);
        });

        log::info!(
            "pipeline started ({} Hz at {} Hz, fft {} keep 1/{})",
            sample_rate,
            center_freq,
            config.fft_width,
            config.keep_one_in
        );

        Self {
            shared,
            source: source_node,
            sample_rate,
            spectrum,
            decoder_factory: None,
            source_running,
            reader: Some(reader),
            worker: Some(worker),
        }
    }

    /// Decoders attached to demodulation chains created from now on
    pub fn set_decoder_factory(&mut self, factory: DecoderFactory) {
        self.decoder_factory = Some(factory);
    }

    /// Current edges, sorted
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let topo = lock(&self.shared.topology);
        let mut edges: Vec<(NodeId, NodeId)> = topo
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i), n)))
            .flat_map(|(id, n)| n.outputs.iter().map(move |&o| (id, o)))
            .collect();
        edges.sort();
        edges
    }

    /// Halt the pipeline. Blocks already decoded stay in their chains' queues.
    pub fn stop(&mut self) {
        self.source_running.store(false, Ordering::SeqCst);
        {
            let mut c = lock(&self.shared.control);
            c.running = false;
            c.paused = false;
        }
        self.shared.cond.notify_all();

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }

    fn require_paused(&self) -> Result<(), GraphError> {
        let c = lock(&self.shared.control);
        if c.paused && c.parked {
            Ok(())
        } else {
            Err(GraphError::NotPaused)
        }
    }
}

impl Drop for Flowgraph {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, rx: Receiver<SampleBuf>, source: NodeId) {
    loop {
        {
            let mut c = lock(&shared.control);
            while c.paused && c.running {
                c.parked = true;
                shared.cond.notify_all();
                c = shared.cond.wait(c).unwrap_or_else(|p| p.into_inner());
            }
            c.parked = false;
            if !c.running {
                break;
            }
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(buf) => {
                let mut topo = lock(&shared.topology);
                topo.run(source, &buf.data);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("source finished, pipeline stopping");
                break;
            }
        }
    }

    let mut c = lock(&shared.control);
    c.running = false;
    c.parked = false;
    shared.cond.notify_all();
}

impl Backend for Flowgraph {
    fn is_running(&self) -> bool {
        lock(&self.shared.control).running
    }

    fn spectrum(&self) -> Option<Vec<f32>> {
        lock(&self.spectrum).clone()
    }

    fn source_node(&self) -> NodeId {
        self.source
    }

    fn source_sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn add_channel(&mut self, spec: &ChannelSpec) -> Result<NodeId, GraphError> {
        if spec.decimation == 0 {
            return Err(GraphError::InvalidChannel(format!(
                "decimation 0 for {} Hz bandwidth at {} Hz",
                spec.bandwidth, self.sample_rate
            )));
        }
        if !(spec.bandwidth > 0.0 && spec.bandwidth < self.sample_rate / 2.0) {
            return Err(GraphError::InvalidChannel(format!(
                "bandwidth {} Hz outside (0, {}) Hz",
                spec.bandwidth,
                self.sample_rate / 2.0
            )));
        }
        let filter =
            ChannelFilter::new(spec.carrier_freq, spec.bandwidth, self.sample_rate, spec.decimation);
        let (decimation, num_taps) = (filter.decimation(), filter.num_taps());
        let id = lock(&self.shared.topology).insert(Box::new(ChannelBlock::new(filter)));
        log::debug!(
            "added channel {} at {:.1} Hz (1/{}, {} taps)",
            id,
            spec.carrier_freq,
            decimation,
            num_taps
        );
        Ok(id)
    }

    fn add_demod_chain(
        &mut self,
        profile: &DemodProfile,
        sample_rate: f64,
    ) -> Result<DemodChain, GraphError> {
        let decoder = self
            .decoder_factory
            .as_ref()
            .and_then(|factory| factory(profile, sample_rate));

        let mut topo = lock(&self.shared.topology);
        let id = NodeId(topo.nodes.len());
        let (chain, tap) = DemodChain::new(id, sample_rate);
        let inserted = topo.insert(Box::new(DemodSink::new(profile, tap, decoder)));
        debug_assert_eq!(inserted, id);
        log::debug!("added {} chain {}", profile.name, id);
        Ok(chain)
    }

    fn pause(&mut self) -> Result<(), GraphError> {
        let mut c = lock(&self.shared.control);
        if !c.running {
            return Err(GraphError::NotRunning);
        }
        c.paused = true;
        while !c.parked && c.running {
            c = self.shared.cond.wait(c).unwrap_or_else(|p| p.into_inner());
        }
        if !c.running {
            c.paused = false;
            return Err(GraphError::NotRunning);
        }
        Ok(())
    }

    fn resume(&mut self) {
        let mut c = lock(&self.shared.control);
        c.paused = false;
        drop(c);
        self.shared.cond.notify_all();
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.require_paused()?;
        let mut topo = lock(&self.shared.topology);
        topo.get(from)?;
        let target = topo.get(to)?;
        match target.input {
            Some(existing) if existing == from => return Err(GraphError::AlreadyConnected(from, to)),
            Some(existing) => return Err(GraphError::InputBusy(to, existing)),
            None => {}
        }
        if to == self.source || topo.is_upstream(to, from) {
            return Err(GraphError::InvalidEdge(from, to));
        }

        topo.link(from, to);
        log::debug!("connected {} -> {}", from, to);
        Ok(())
    }

    fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.require_paused()?;
        let mut topo = lock(&self.shared.topology);
        topo.get(from)?;
        if topo.get(to)?.input != Some(from) {
            return Err(GraphError::NotConnected(from, to));
        }

        topo.unlink(from, to);
        log::debug!("disconnected {} -> {}", from, to);
        Ok(())
    }

    fn release(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.require_paused()?;
        let mut topo = lock(&self.shared.topology);
        let n = topo.get(node)?;
        if node == self.source || n.input.is_some() || !n.outputs.is_empty() {
            return Err(GraphError::NodeInUse(node));
        }
        // The slot is not recycled: a stale NodeId must never alias a new block
        topo.nodes[node.0] = None;
        log::debug!("released {} ({} blocks live)", node, topo.live_count());
        Ok(())
    }
}
