mod pipeline;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use skim_sdr::file::{self, FileSource, SampleFormat};
use skim_sdr::tone::{Tone, ToneSource};
use skim_sdr::SdrSource;
use skim_track::{SignalKind, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "skimmer")]
#[command(about = "Wideband PSK31 skimmer: finds, tracks and channelizes narrowband carriers")]
struct Cli {
    /// IQ or audio file input
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Sample format for file input: ci8, ci16, cf32, f32, wav
    #[arg(long, default_value = "wav")]
    format: SampleFormat,

    /// Sample rate in Hz for raw formats (WAV files carry their own)
    #[arg(short = 'r', long, default_value = "44100")]
    sample_rate: u32,

    /// Pace file input to real time
    #[arg(long)]
    throttle: bool,

    /// Replay the file when it ends
    #[arg(long)]
    repeat: bool,

    /// Synthesize a carrier at this offset in Hz instead of reading a file
    /// (repeatable)
    #[arg(long = "tone", value_name = "HZ")]
    tones: Vec<f64>,

    /// JSON tracker configuration; the flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Signal type to track
    #[arg(long)]
    kind: Option<SignalKind>,

    /// Center frequency in Hz, added to carrier offsets for display
    #[arg(short = 'c', long)]
    center_freq: Option<f64>,

    /// Detection FFT width in bins
    #[arg(long)]
    fft_width: Option<usize>,

    /// Detect on one FFT vector in this many
    #[arg(long)]
    keep_one_in: Option<usize>,

    /// Peak sharpness threshold
    #[arg(long)]
    cutoff: Option<f64>,

    /// Frequency tolerance for matching a peak to a carrier, Hz
    #[arg(long)]
    tolerance: Option<f64>,

    /// Missed scans before a carrier goes inactive
    #[arg(long)]
    silence_threshold: Option<u32>,

    /// Forget silent, text-less carriers this many scans after they go
    /// inactive
    #[arg(long)]
    evict_after: Option<u32>,

    /// Control loop period in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Stop after this many seconds
    #[arg(short = 'd', long)]
    duration: Option<f64>,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let source = open_source(cli, &config)?;

    let duration = match cli.duration {
        Some(secs) => {
            ensure!(secs.is_finite() && secs >= 0.0, "invalid duration: {}", secs);
            Some(Duration::from_secs_f64(secs))
        }
        None => None,
    };
    let options = pipeline::RunOptions {
        interval: Duration::from_millis(cli.interval_ms.max(1)),
        duration,
    };

    pipeline::run(source, &config, &options)
}

/// Defaults, then the JSON file, then individual flags.
fn load_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => TrackerConfig::default(),
    };

    if let Some(kind) = cli.kind {
        config.kind = kind;
    }
    if let Some(center_freq) = cli.center_freq {
        config.center_freq = center_freq;
    }
    if let Some(fft_width) = cli.fft_width {
        config.fft_width = fft_width;
    }
    if let Some(keep_one_in) = cli.keep_one_in {
        config.keep_one_in = keep_one_in;
    }
    if let Some(cutoff) = cli.cutoff {
        config.cutoff = cutoff;
    }
    if let Some(tolerance) = cli.tolerance {
        config.tolerance_hz = tolerance;
    }
    if let Some(threshold) = cli.silence_threshold {
        config.silence_threshold = threshold;
    }
    if cli.evict_after.is_some() {
        config.evict_after = cli.evict_after;
    }

    config.validate()?;
    Ok(config)
}

fn open_source(cli: &Cli, config: &TrackerConfig) -> Result<Box<dyn SdrSource>> {
    if let Some(path) = &cli.file {
        let sample_rate = match cli.format {
            SampleFormat::Wav => file::wav_sample_rate(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
            _ => cli.sample_rate,
        };
        ensure!(sample_rate > 0, "sample rate must be positive");

        let mut source = FileSource::new(
            path.to_string_lossy().to_string(),
            cli.format,
            sample_rate,
            config.center_freq,
        );
        source.set_throttle(cli.throttle);
        source.set_repeat(cli.repeat);
        log::info!(
            "reading {} ({:?}, {} Hz)",
            path.display(),
            cli.format,
            sample_rate
        );
        return Ok(Box::new(source));
    }

    if !cli.tones.is_empty() {
        ensure!(cli.sample_rate > 0, "sample rate must be positive");
        let tones = cli.tones.iter().map(|&f| Tone::new(f, 1.0)).collect();
        let mut source = ToneSource::new(tones, cli.sample_rate);
        source.set_throttle(true);
        log::info!("synthesizing {} tone(s) at {} Hz", cli.tones.len(), cli.sample_rate);
        return Ok(Box::new(source));
    }

    bail!("no input specified. Use -f <file> for file input or --tone <Hz> for a test carrier.")
}
