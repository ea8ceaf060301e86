use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::Sender;
use num_complex::Complex32;

use crate::file::Pacer;
use crate::{SampleBuf, SdrSource, SourceError};

/// A complex tone at `freq` Hz offset from centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub freq: f64,
    pub amplitude: f32,
}

impl Tone {
    pub fn new(freq: f64, amplitude: f32) -> Self {
        Self { freq, amplitude }
    }
}

/// Synthetic source: a sum of complex tones, generated block by block
/// until stopped. The tone set can be changed while streaming through
/// [`ToneSource::tones_handle`], which makes carriers appear and vanish.
pub struct ToneSource {
    tones: Arc<Mutex<Vec<Tone>>>,
    sample_rate: u32,
    block_size: usize,
    throttle: bool,
    running: Arc<AtomicBool>,
}

impl ToneSource {
    pub fn new(tones: Vec<Tone>, sample_rate: u32) -> Self {
        Self {
            tones: Arc::new(Mutex::new(tones)),
            sample_rate,
            block_size: 4096,
            throttle: false,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    pub fn set_throttle(&mut self, throttle: bool) {
        self.throttle = throttle;
    }

    /// Shared handle to the tone set
    pub fn tones_handle(&self) -> Arc<Mutex<Vec<Tone>>> {
        self.tones.clone()
    }
}

impl SdrSource for ToneSource {
    fn start(&mut self, tx: Sender<SampleBuf>) -> Result<(), SourceError> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("generating tones at {} Hz", self.sample_rate);

        let rate = self.sample_rate.max(1) as f64;
        let mut pacer = Pacer::new(self.throttle, self.sample_rate);
        let mut n: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            let tones = match self.tones.lock() {
                Ok(t) => t.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };

            let data: Vec<Complex32> = (0..self.block_size as u64)
                .map(|i| {
                    let t = (n + i) as f64 / rate;
                    tones.iter().fold(Complex32::new(0.0, 0.0), |acc, tone| {
                        // Reduce the phase before converting so long runs keep precision
                        let phase = (2.0 * PI * (tone.freq * t).fract()) as f32;
                        acc + Complex32::from_polar(tone.amplitude, phase)
                    })
                })
                .collect();
            n += self.block_size as u64;

            if tx.send(SampleBuf { data }).is_err() {
                break; // receiver dropped
            }
            pacer.advance(self.block_size);
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn center_frequency(&self) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    #[test]
    fn test_tone_source_streams_until_receiver_dropped() {
        let mut source = ToneSource::new(vec![Tone::new(1000.0, 1.0)], 8000);
        source.set_block_size(800);
        let (tx, rx) = channel::bounded(1);

        let handle = std::thread::spawn(move || source.start(tx));
        let first = rx.recv().unwrap();
        assert_eq!(first.num_samples(), 800);
        // Constant envelope, phase advancing by 2*pi/8 per sample
        for s in &first.data {
            assert!((s.norm() - 1.0).abs() < 1e-4);
        }
        let step = (first.data[1] * first.data[0].conj()).arg();
        assert!((step - std::f32::consts::FRAC_PI_4).abs() < 1e-3);

        drop(rx);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_tones_can_be_removed_while_streaming() {
        let mut source = ToneSource::new(vec![Tone::new(500.0, 1.0)], 8000);
        source.set_block_size(100);
        let tones = source.tones_handle();
        let running = source.running_flag();
        let (tx, rx) = channel::bounded(1);
        let handle = std::thread::spawn(move || source.start(tx));

        let _ = rx.recv().unwrap();
        tones.lock().unwrap().clear();
        // Drain anything generated before the change
        let silent = loop {
            let buf = rx.recv().unwrap();
            if buf.data.iter().all(|s| s.norm() == 0.0) {
                break buf;
            }
        };
        assert_eq!(silent.num_samples(), 100);

        running.store(false, Ordering::SeqCst);
        drop(rx);
        assert!(handle.join().unwrap().is_ok());
    }
}
