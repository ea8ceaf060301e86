use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use num_complex::Complex32;

use crate::block::Block;
use crate::{DemodProfile, NodeId};

/// Symbol recovery and bit decoding for one channel.
///
/// The chain feeds every decoded-baseband block to the decoder and forwards
/// whatever bytes it emits to the signal's queue.
pub trait Decoder: Send {
    fn set_sample_rate(&mut self, sample_rate: f64);
    fn decode(&mut self, baseband: &[Complex32], out: &mut Vec<u8>);
}

/// Builds a decoder for a profile at a given input rate. `None` leaves the
/// chain measuring level only.
pub type DecoderFactory =
    Box<dyn Fn(&DemodProfile, f64) -> Option<Box<dyn Decoder>> + Send + Sync>;

/// Control-side handle to a demodulation chain living in the backend.
#[derive(Debug)]
pub struct DemodChain {
    node: NodeId,
    decoded: Receiver<Vec<u8>>,
    sample_rate: Arc<AtomicU64>,
    level: Arc<AtomicU32>,
}

/// Backend-side end of a [`DemodChain`].
#[derive(Debug, Clone)]
pub struct ChainTap {
    decoded: Sender<Vec<u8>>,
    sample_rate: Arc<AtomicU64>,
    level: Arc<AtomicU32>,
}

impl DemodChain {
    /// Create a connected handle/tap pair for the block at `node`.
    pub fn new(node: NodeId, sample_rate: f64) -> (DemodChain, ChainTap) {
        let (tx, rx) = channel::unbounded();
        let rate = Arc::new(AtomicU64::new(sample_rate.to_bits()));
        let level = Arc::new(AtomicU32::new(0f32.to_bits()));
        (
            DemodChain {
                node,
                decoded: rx,
                sample_rate: rate.clone(),
                level: level.clone(),
            },
            ChainTap {
                decoded: tx,
                sample_rate: rate,
                level,
            },
        )
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Take every byte decoded since the last call.
    pub fn drain_decoded_bytes(&self) -> Vec<u8> {
        self.decoded.try_iter().flatten().collect()
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    /// Mean power of the last baseband block the chain received
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}

impl ChainTap {
    /// Queue decoded bytes for the control side. Bytes sent after the handle
    /// is dropped are discarded.
    pub fn emit(&self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            let _ = self.decoded.send(bytes);
        }
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    fn set_level(&self, level: f32) {
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }
}

/// Terminal block of a channel: measures level and runs the decoder.
pub struct DemodSink {
    name: String,
    tap: ChainTap,
    decoder: Option<Box<dyn Decoder>>,
    decoder_rate: f64,
    scratch: Vec<u8>,
}

impl DemodSink {
    pub fn new(profile: &DemodProfile, tap: ChainTap, decoder: Option<Box<dyn Decoder>>) -> Self {
        let decoder_rate = tap.sample_rate();
        Self {
            name: format!("{}-demod", profile.name),
            tap,
            decoder,
            decoder_rate,
            scratch: Vec::new(),
        }
    }
}

impl Block for DemodSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn work(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        if input.is_empty() {
            return Vec::new();
        }
        let power = input.iter().map(|s| s.norm_sqr()).sum::<f32>() / input.len() as f32;
        self.tap.set_level(power);

        if let Some(decoder) = self.decoder.as_mut() {
            let rate = self.tap.sample_rate();
            if rate != self.decoder_rate {
                decoder.set_sample_rate(rate);
                self.decoder_rate = rate;
            }
            self.scratch.clear();
            decoder.decode(input, &mut self.scratch);
            self.tap.emit(std::mem::take(&mut self.scratch));
        }
        Vec::new()
    }
}
