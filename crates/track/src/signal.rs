use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use skim_graph::{DemodChain, DemodProfile, NodeId};

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a tracked signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    fn next() -> Self {
        SignalId(NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig{}", self.0)
    }
}

/// Modulation types the tracker knows how to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    #[default]
    Psk31,
}

impl SignalKind {
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Psk31 => "psk31",
        }
    }

    /// Channel bandwidth, Hz
    pub fn bandwidth(self) -> f64 {
        match self {
            SignalKind::Psk31 => 80.0,
        }
    }

    /// Symbol rate, baud
    pub fn symbol_rate(self) -> f64 {
        match self {
            SignalKind::Psk31 => 31.25,
        }
    }

    pub fn profile(self) -> DemodProfile {
        DemodProfile {
            name: self.name(),
            bandwidth: self.bandwidth(),
            symbol_rate: self.symbol_rate(),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "psk31" => Ok(SignalKind::Psk31),
            _ => Err(format!("unknown signal kind: {} (expected psk31)", s)),
        }
    }
}

/// Copy of the channel the Channelizer wired for a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelHandle {
    pub channel: NodeId,
    /// Rate the channel delivers to the chain, Hz
    pub output_rate: f64,
}

/// One narrowband carrier being tracked.
#[derive(Debug)]
pub struct Signal {
    pub id: SignalId,
    pub kind: SignalKind,
    /// Offset from the source centre frequency, Hz
    pub carrier_freq: f64,
    pub bandwidth: f64,
    /// Rate the demodulation chain runs at, Hz
    pub sample_rate: f64,
    pub consecutive_silences: u32,
    pub active: bool,
    /// Channel allocation failed; never retried
    pub unreachable: bool,
    pub channel_handle: Option<ChannelHandle>,
    pub chain: Option<DemodChain>,
    pub decoded_text: String,
}

impl Signal {
    /// A new, active signal whose chain would run at `sample_rate` until a
    /// channel is allocated.
    pub fn new(kind: SignalKind, carrier_freq: f64, sample_rate: f64) -> Self {
        Self {
            id: SignalId::next(),
            kind,
            carrier_freq,
            bandwidth: kind.bandwidth(),
            sample_rate,
            consecutive_silences: 0,
            active: true,
            unreachable: false,
            channel_handle: None,
            chain: None,
            decoded_text: String::new(),
        }
    }

    pub fn is_wired(&self) -> bool {
        self.channel_handle.is_some()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        if let Some(chain) = &self.chain {
            chain.set_sample_rate(sample_rate);
        }
    }

    /// Attach the demodulation chain and bring it to the signal's rate.
    pub fn attach_chain(&mut self, chain: DemodChain) {
        chain.set_sample_rate(self.sample_rate);
        self.chain = Some(chain);
    }

    /// Append everything the chain decoded since the last call and return
    /// the full text so far.
    pub fn get_message(&mut self) -> &str {
        if let Some(chain) = &self.chain {
            let bytes = chain.drain_decoded_bytes();
            append_printable(&bytes, &mut self.decoded_text);
        }
        &self.decoded_text
    }

    pub fn view(&self) -> SignalView<'_> {
        SignalView {
            id: self.id,
            carrier_freq: self.carrier_freq,
            active: self.active,
            unreachable: self.unreachable,
            decoded_text: &self.decoded_text,
        }
    }
}

/// Line endings become `\n`, other control bytes `?`, the rest Latin-1.
pub fn append_printable(bytes: &[u8], out: &mut String) {
    out.reserve(bytes.len());
    for &b in bytes {
        let c = match b {
            b'\r' | b'\n' => '\n',
            0..=0x1f => '?',
            _ => char::from(b),
        };
        out.push(c);
    }
}

/// Read-only view for renderers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalView<'a> {
    pub id: SignalId,
    pub carrier_freq: f64,
    pub active: bool,
    pub unreachable: bool,
    pub decoded_text: &'a str,
}
