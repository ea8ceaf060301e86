use crate::signal::{Signal, SignalKind};

/// Builds new signals for carriers the tracker has not seen before.
pub trait SignalFactory: Send {
    fn kind(&self) -> SignalKind;
    fn create(&self, carrier_freq: f64) -> Signal;
}

/// PSK31 signals whose chains start at the source rate.
#[derive(Debug, Clone, Copy)]
pub struct Psk31Factory {
    source_rate: f64,
}

impl Psk31Factory {
    pub fn new(source_rate: f64) -> Self {
        Self { source_rate }
    }
}

impl SignalFactory for Psk31Factory {
    fn kind(&self) -> SignalKind {
        SignalKind::Psk31
    }

    fn create(&self, carrier_freq: f64) -> Signal {
        Signal::new(SignalKind::Psk31, carrier_freq, self.source_rate)
    }
}

/// Factory for a configured kind.
pub fn factory_for(kind: SignalKind, source_rate: f64) -> Box<dyn SignalFactory> {
    match kind {
        SignalKind::Psk31 => Box::new(Psk31Factory::new(source_rate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psk31_factory() {
        let factory = factory_for(SignalKind::Psk31, 44100.0);
        assert_eq!(factory.kind(), SignalKind::Psk31);
        let signal = factory.create(1234.5);
        assert_eq!(signal.kind, SignalKind::Psk31);
        assert_eq!(signal.carrier_freq, 1234.5);
        assert_eq!(signal.sample_rate, 44100.0);
        assert_eq!(signal.consecutive_silences, 0);
        assert!(signal.active);
    }
}
