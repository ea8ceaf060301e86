// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::{SampleBuf, SdrSource, SourceError};

/// Sample format for file input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Complex int8 (CS8): pairs of i8
    Ci8,
    /// Complex int16 (CS16): pairs of i16, little-endian
    Ci16,
    /// Complex float32 (CF32): pairs of f32, little-endian
    Cf32,
    /// Real float32 audio, little-endian
    F32,
    /// RIFF WAV: mono is real audio, stereo is I/Q
    Wav,
}

impl SampleFormat {
    /// Bytes per sample frame for the raw formats
    fn frame_bytes(self) -> usize {
        match self {
            SampleFormat::Ci8 => 2,
            SampleFormat::Ci16 => 4,
            SampleFormat::Cf32 => 8,
            SampleFormat::F32 => 4,
            SampleFormat::Wav => 0,
        }
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ci8" => Ok(SampleFormat::Ci8),
            "ci16" => Ok(SampleFormat::Ci16),
            "cf32" => Ok(SampleFormat::Cf32),
            "f32" => Ok(SampleFormat::F32),
            "wav" => Ok(SampleFormat::Wav),
            other => Err(format!(
                "unknown sample format: {} (use ci8, ci16, cf32, f32 or wav)",
                other
            )),
        }
    }
}

/// Read the sample rate from a WAV header.
pub fn wav_sample_rate(path: &Path) -> Result<u32, SourceError> {
    let reader = hound::WavReader::open(path)?;
    Ok(reader.spec().sample_rate)
}

/// File reader: reads samples from a file and sends them as SampleBuf blocks.
///
/// With `throttle` set, blocks are paced to the nominal sample rate so the
/// control loop sees the recording unfold in real time. With `repeat` set,
/// the file is replayed from the start at end of file.
pub struct FileSource {
    path: String,
    format: SampleFormat,
    sample_rate: u32,
    center_freq: f64,
    /// Number of complex samples per block
    block_size: usize,
    throttle: bool,
    repeat: bool,
    running: Arc<AtomicBool>,
}

impl FileSource {
    pub fn new(
        path: impl Into<String>,
        format: SampleFormat,
        sample_rate: u32,
        center_freq: f64,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            sample_rate,
            center_freq,
            block_size: 4096,
            throttle: false,
            repeat: false,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    pub fn set_throttle(&mut self, throttle: bool) {
        self.throttle = throttle;
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    /// Read one block of raw frames and convert to complex samples.
    fn read_block_raw(
        reader: &mut BufReader<File>,
        format: SampleFormat,
        num_samples: usize,
    ) -> io::Result<Option<Vec<Complex32>>> {
        let frame = format.frame_bytes();
        let mut buf = vec![0u8; num_samples * frame];
        let n = read_full(reader, &mut buf)?;
        if n < frame {
            return Ok(None);
        }
        let actual_samples = n / frame;
        let mut out = Vec::with_capacity(actual_samples);
        for i in 0..actual_samples {
            let b = &buf[i * frame..(i + 1) * frame];
            let sample = match format {
                SampleFormat::Ci8 => {
                    Complex32::new(b[0] as i8 as f32 / 128.0, b[1] as i8 as f32 / 128.0)
                }
                SampleFormat::Ci16 => Complex32::new(
                    i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0,
                    i16::from_le_bytes([b[2], b[3]]) as f32 / 32768.0,
                ),
                SampleFormat::Cf32 => Complex32::new(
                    f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    f32::from_le_bytes([b[4], b[5], b[6], b[7]]),
                ),
                SampleFormat::F32 => {
                    Complex32::new(f32::from_le_bytes([b[0], b[1], b[2], b[3]]), 0.0)
                }
                SampleFormat::Wav => unreachable!("WAV is decoded by hound"),
            };
            out.push(sample);
        }
        Ok(Some(out))
    }

    /// One pass over a raw file. Returns false if the receiver went away.
    fn stream_raw(&self, tx: &Sender<SampleBuf>, pacer: &mut Pacer) -> Result<bool, SourceError> {
        let file = File::open(&self.path).map_err(|e| SourceError::Open {
            path: self.path.clone(),
            source: e,
        })?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        while self.running.load(Ordering::SeqCst) {
            match Self::read_block_raw(&mut reader, self.format, self.block_size)? {
                Some(data) => {
                    let n = data.len();
                    if tx.send(SampleBuf { data }).is_err() {
                        return Ok(false);
                    }
                    pacer.advance(n);
                }
                None => break,
            }
        }
        Ok(true)
    }

    /// One pass over a WAV file. Returns false if the receiver went away.
    fn stream_wav(&self, tx: &Sender<SampleBuf>, pacer: &mut Pacer) -> Result<bool, SourceError> {
        let mut reader = hound::WavReader::open(&self.path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels != 1 && channels != 2 {
            return Err(SourceError::WavLayout(format!(
                "{} channels (expected 1 or 2)",
                channels
            )));
        }

        let samples: Box<dyn Iterator<Item = Result<f32, hound::Error>> + '_> =
            match spec.sample_format {
                hound::SampleFormat::Float => Box::new(reader.samples::<f32>()),
                hound::SampleFormat::Int => {
                    let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                    Box::new(reader.samples::<i32>().map(move |s| s.map(|v| v as f32 * scale)))
                }
            };

        let mut block = Vec::with_capacity(self.block_size);
        let mut pending_i: Option<f32> = None;
        for value in samples {
            if !self.running.load(Ordering::SeqCst) {
                return Ok(true);
            }
            let value = value?;
            let sample = if channels == 1 {
                Complex32::new(value, 0.0)
            } else if let Some(i) = pending_i.take() {
                Complex32::new(i, value)
            } else {
                pending_i = Some(value);
                continue;
            };
            block.push(sample);
            if block.len() == self.block_size {
                let data = std::mem::replace(&mut block, Vec::with_capacity(self.block_size));
                if tx.send(SampleBuf { data }).is_err() {
                    return Ok(false);
                }
                pacer.advance(self.block_size);
            }
        }
        if !block.is_empty() {
            let n = block.len();
            if tx.send(SampleBuf { data: block }).is_err() {
                return Ok(false);
            }
            pacer.advance(n);
        }
        Ok(true)
    }
}

/// Fill `buf` as far as the reader allows; returns the byte count.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Sleeps so that samples are emitted no faster than the sample rate.
pub(crate) struct Pacer {
    enabled: bool,
    sample_rate: f64,
    start: Instant,
    sent: u64,
}

impl Pacer {
    pub(crate) fn new(enabled: bool, sample_rate: u32) -> Self {
        Self {
            enabled,
            sample_rate: sample_rate.max(1) as f64,
            start: Instant::now(),
            sent: 0,
        }
    }

    pub(crate) fn advance(&mut self, samples: usize) {
        self.sent += samples as u64;
        if !self.enabled {
            return;
        }
        let due = Duration::from_secs_f64(self.sent as f64 / self.sample_rate);
        let elapsed = self.start.elapsed();
        if due > elapsed {
            std::thread::sleep(due - elapsed);
        }
    }
}

impl SdrSource for FileSource {
    fn start(&mut self, tx: Sender<SampleBuf>) -> Result<(), SourceError> {
        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "reading samples from {} ({:?}, {} Hz, centre {} Hz)",
            self.path,
            self.format,
            self.sample_rate,
            self.center_freq
        );

        let mut pacer = Pacer::new(self.throttle, self.sample_rate);
        while self.running.load(Ordering::SeqCst) {
            let more = match self.format {
                SampleFormat::Wav => self.stream_wav(&tx, &mut pacer)?,
                _ => self.stream_raw(&tx, &mut pacer)?,
            };
            if !more {
                break; // receiver dropped
            }
            if !self.repeat {
                log::info!("end of file: {}", self.path);
                break;
            }
            log::debug!("rewinding {}", self.path);
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
        self.center_freq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("skim-sdr-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("ci16".parse::<SampleFormat>(), Ok(SampleFormat::Ci16));
        assert_eq!("wav".parse::<SampleFormat>(), Ok(SampleFormat::Wav));
        assert!("cu8".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn test_read_ci16_file() {
        let path = temp_path("ci16.raw");
        {
            let mut f = File::create(&path).unwrap();
            for v in [16384i16, -16384, 0, 32767] {
                f.write_all(&v.to_le_bytes()).unwrap();
            }
        }

        let mut source =
            FileSource::new(path.to_string_lossy(), SampleFormat::Ci16, 8000, 14_070_000.0);
        assert_eq!(source.center_frequency(), 14_070_000.0);
        let (tx, rx) = channel::unbounded();
        source.start(tx).unwrap();

        let samples: Vec<Complex32> = rx.iter().flat_map(|b| b.data).collect();
        assert_eq!(samples.len(), 2);
        assert!((samples[0].re - 0.5).abs() < 1e-4);
        assert!((samples[0].im + 0.5).abs() < 1e-4);
        assert!(samples[1].re.abs() < 1e-6);
        assert!(!source.running_flag().load(Ordering::SeqCst));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_read_mono_wav_file() {
        let path = temp_path("mono.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 11025,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        {
            let mut writer = hound::WavWriter::create(&path, spec).unwrap();
            for i in 0..100 {
                writer.write_sample(if i % 2 == 0 { 16384i16 } else { -16384 }).unwrap();
            }
            writer.finalize().unwrap();
        }

        assert_eq!(wav_sample_rate(&path).unwrap(), 11025);

        let mut source = FileSource::new(path.to_string_lossy(), SampleFormat::Wav, 11025, 0.0);
        source.set_block_size(32);
        let (tx, rx) = channel::unbounded();
        source.start(tx).unwrap();

        let blocks: Vec<SampleBuf> = rx.iter().collect();
        assert_eq!(blocks.len(), 4);
        let samples: Vec<Complex32> = blocks.into_iter().flat_map(|b| b.data).collect();
        assert_eq!(samples.len(), 100);
        assert!((samples[0].re - 0.5).abs() < 1e-4);
        assert_eq!(samples[0].im, 0.0);
        assert!((samples[1].re + 0.5).abs() < 1e-4);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut source = FileSource::new("/nonexistent/skim.raw", SampleFormat::Cf32, 8000, 0.0);
        let (tx, _rx) = channel::unbounded();
        assert!(matches!(source.start(tx), Err(SourceError::Open { .. })));
    }
}
