use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{info, warn};
use pulse_lib::{
    clock::ManualClock,
    config::AnalysisConfig,
    filters::{FilterProfile, SampleFilter},
    io::{
        message::{parse_message, DeviceMessage},
        recording as recording_io, text as text_io,
    },
    metrics::{heart_rate::DisplayedBpm, heart_rate::HeartRateStats, rhythm::RhythmResult},
    session::{BeatAnalysis, EcgSession, SampleOutput},
    signal::{AdcScale, Sample},
};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "Pulse: real-time ECG processing tools"
)]
struct Cli {
    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ProfileArg {
    #[value(name = "minimal")]
    Minimal,
    #[value(name = "medical-grade")]
    MedicalGrade,
}

impl From<ProfileArg> for FilterProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Minimal => FilterProfile::Minimal,
            ProfileArg::MedicalGrade => FilterProfile::MedicalGrade,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Samples,
    Analysis,
    All,
}

impl Emit {
    fn samples(self) -> bool {
        matches!(self, Emit::Samples | Emit::All)
    }

    fn analysis(self) -> bool {
        matches!(self, Emit::Analysis | Emit::All)
    }
}

/// Configuration file plus the overrides most often changed from the command line.
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// TOML configuration; missing keys take their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Sampling rate in Hz
    #[arg(long)]
    fs: Option<f64>,
    #[arg(long)]
    profile: Option<ProfileArg>,
    /// Mains frequency to notch out (Hz)
    #[arg(long)]
    mains: Option<f64>,
}

impl ConfigArgs {
    fn load(&self) -> Result<AnalysisConfig> {
        let mut cfg = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(fs) = self.fs {
            cfg.sample_rate_hz = fs;
        }
        if let Some(profile) = self.profile {
            cfg.filter.profile = profile.into();
        }
        if let Some(mains) = self.mains {
            cfg.filter.mains_hz = mains;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process JSON device messages line by line, emitting JSON lines
    Monitor {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long, value_enum, default_value = "all")]
        emit: Emit,
    },
    /// Replay a whole recording and print a JSON summary
    Analyze {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Input is a `timestamp,value` CSV instead of plain values
        #[arg(long)]
        csv: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Filter newline-delimited samples, one value per output line
    Filter {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Convert ADC codes to millivolts
    ToMv {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 4095.0)]
        max_code: f64,
        #[arg(long, default_value_t = 3300.0)]
        vref_mv: f64,
        #[arg(long, default_value_t = 1.0)]
        gain: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Monitor {
            input,
            config,
            emit,
        } => cmd_monitor(input.as_deref(), &config, emit)?,
        Commands::Analyze { input, csv, config } => cmd_analyze(input.as_deref(), csv, &config)?,
        Commands::Filter { input, config } => cmd_filter(input.as_deref(), &config)?,
        Commands::ToMv {
            input,
            max_code,
            vref_mv,
            gain,
        } => cmd_to_mv(
            input.as_deref(),
            AdcScale {
                max_code,
                vref_mv,
                gain,
            },
        )?,
    }
    Ok(())
}

fn open_input(input: Option<&Path>) -> Result<Box<dyn BufRead>> {
    Ok(match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum MonitorLine {
    Sample(SampleOutput),
    Beat(BeatAnalysis),
    Status { status: String },
}

fn emit(line: &MonitorLine) -> Result<()> {
    println!("{}", serde_json::to_string(line)?);
    Ok(())
}

fn cmd_monitor(input: Option<&Path>, config: &ConfigArgs, mode: Emit) -> Result<()> {
    let cfg = config.load()?;
    let period_ms = cfg.sample_period_ms();
    // Unstamped messages are replayed at the nominal rate.
    let clock = ManualClock::default();
    let mut replay_ms = 0.0_f64;
    let mut session = EcgSession::new(cfg, &clock)?;

    let (mut processed, mut skipped) = (0usize, 0usize);
    for (idx, line) in open_input(input)?.lines().enumerate() {
        let line = line.context("reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        let message = match parse_message(&line) {
            Ok(message) => message,
            Err(err) => {
                warn!("skipping line {}: {:#}", idx + 1, err);
                skipped += 1;
                continue;
            }
        };
        match message {
            DeviceMessage::Status { status } => {
                info!("device status: {}", status);
                emit(&MonitorLine::Status { status })?;
            }
            DeviceMessage::Sample {
                value,
                timestamp_ms,
            } => {
                let output = match timestamp_ms {
                    Some(ts) => {
                        clock.set(ts);
                        replay_ms = ts as f64 + period_ms;
                        session.push_sample(Sample::new(value, ts))
                    }
                    None => {
                        clock.set(replay_ms.round() as u64);
                        replay_ms += period_ms;
                        session.push_value(value)
                    }
                };
                processed += 1;
                if mode.samples() {
                    emit(&MonitorLine::Sample(output))?;
                }
                if mode.analysis() && session.due_for_analysis() {
                    if let Some(analysis) = session.analyze() {
                        emit(&MonitorLine::Beat(analysis))?;
                    }
                }
            }
        }
    }
    info!("processed {} samples, skipped {} lines", processed, skipped);
    Ok(())
}

#[derive(Serialize)]
struct AnalyzeSummary {
    samples: usize,
    sample_rate_hz: f64,
    duration_ms: u64,
    peaks: usize,
    bpm: DisplayedBpm,
    heart_rate: HeartRateStats,
    signal_quality: u8,
    rhythm: RhythmResult,
    analysis: Option<BeatAnalysis>,
}

fn cmd_analyze(input: Option<&Path>, csv: bool, config: &ConfigArgs) -> Result<()> {
    let mut cfg = config.load()?;
    let samples = if csv {
        let samples = match input {
            Some(path) => recording_io::read_recording_csv(path)?,
            None => recording_io::parse_recording_csv(io::stdin())?,
        };
        if config.fs.is_none() {
            if let Some(fs) = recording_io::estimate_sample_rate(&samples) {
                info!("sample rate {:.1} Hz from timestamps", fs);
                cfg.sample_rate_hz = fs;
            }
        }
        samples
    } else {
        text_io::series_to_samples(&read_samples(input)?, cfg.sample_rate_hz)
    };

    let sample_rate_hz = cfg.sample_rate_hz;
    let clock = ManualClock::default();
    let mut session = EcgSession::new(cfg, &clock)?;
    for sample in &samples {
        clock.set(sample.timestamp_ms);
        session.push_sample(*sample);
    }
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first.timestamp_ms, last.timestamp_ms),
        _ => bail!("no samples to analyze"),
    };

    let summary = AnalyzeSummary {
        samples: samples.len(),
        sample_rate_hz,
        duration_ms: last.saturating_sub(first),
        peaks: session.peaks().len(),
        bpm: session.heart_rate().displayed(last),
        heart_rate: session.heart_rate_stats(),
        signal_quality: session.signal_quality(),
        rhythm: session.rhythm(),
        analysis: session.analyze(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_filter(input: Option<&Path>, config: &ConfigArgs) -> Result<()> {
    let cfg = config.load()?;
    let filter = SampleFilter::from_config(&cfg)?;
    let samples = read_samples(input)?;
    for value in filter.filter(&samples) {
        println!("{}", value);
    }
    Ok(())
}

fn cmd_to_mv(input: Option<&Path>, scale: AdcScale) -> Result<()> {
    if scale.max_code.is_nan() || scale.max_code <= 0.0 {
        bail!("--max-code must be positive");
    }
    for value in read_samples(input)? {
        println!("{}", scale.to_mv(value));
    }
    Ok(())
}
