use std::collections::VecDeque;
use std::fmt;

use crate::{Backend, GraphError, NodeId};

/// A deferred topology change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Connect(NodeId, NodeId),
    Disconnect(NodeId, NodeId),
    Release(NodeId),
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Connect(a, b) => write!(f, "connect {} -> {}", a, b),
            Directive::Disconnect(a, b) => write!(f, "disconnect {} -> {}", a, b),
            Directive::Release(n) => write!(f, "release {}", n),
        }
    }
}

/// Outcome of one [`MutationQueue::flush`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub applied: usize,
    pub failed: usize,
}

/// Ordered batch of topology changes.
///
/// Directives are only recorded here; `flush` applies them to the backend
/// inside a single pause so the streaming thread never sees a half-rewired
/// graph.
#[derive(Debug, Default)]
pub struct MutationQueue {
    pending: VecDeque<Directive>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.pending.push_back(Directive::Connect(from, to));
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        self.pending.push_back(Directive::Disconnect(from, to));
    }

    pub fn release(&mut self, node: NodeId) {
        self.pending.push_back(Directive::Release(node));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Directive> {
        self.pending.iter()
    }

    /// Drop everything not yet applied.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Apply all pending directives in submission order between one
    /// `pause`/`resume` pair.
    ///
    /// A directive the backend rejects is logged and skipped; the rest still
    /// apply. If the backend is not running nothing is applied and the queue
    /// is left as it was.
    pub fn flush<B: Backend + ?Sized>(&mut self, backend: &mut B) -> Result<FlushReport, GraphError> {
        if !backend.is_running() {
            return Err(GraphError::NotRunning);
        }
        if self.pending.is_empty() {
            return Ok(FlushReport::default());
        }

        backend.pause()?;
        let mut report = FlushReport::default();
        while let Some(directive) = self.pending.pop_front() {
            let result = match directive {
                Directive::Connect(a, b) => backend.connect(a, b),
                Directive::Disconnect(a, b) => backend.disconnect(a, b),
                Directive::Release(n) => backend.release(n),
            };
            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    log::warn!("skipping {}: {}", directive, e);
                    report.failed += 1;
                }
            }
        }
        backend.resume();

        log::debug!("flushed {} directives ({} failed)", report.applied + report.failed, report.failed);
        Ok(report)
    }
}
