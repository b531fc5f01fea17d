use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (esframe ",
    env!("ESFRAME_VERSION"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting and extracting audio elementary streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print stream information
    Info(InfoArgs),

    /// Extract frames from the specified stream into a file.
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input elementary stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Write a YAML index of every frame to this path.
    #[arg(long, value_name = "PATH")]
    pub frames: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input elementary stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Container for the output.
    #[arg(long, value_enum, default_value_t = OutputFormat::Raw)]
    pub format: OutputFormat,

    /// Treat the input as headerless 16-bit little-endian PCM with this many
    /// channels.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..=32))]
    pub pcm_channels: Option<u16>,

    /// Sampling rate of PCM input.
    #[arg(
        long,
        value_name = "HZ",
        default_value_t = 48000,
        value_parser = clap::value_parser!(u32).range(1..=768_000)
    )]
    pub pcm_rate: u32,

    /// Widen 5.1 PCM to 8 channels with a silent pair.
    #[arg(long)]
    pub expand_5_1: bool,

    /// Timestamp attached to the first input byte.
    #[arg(long, value_name = "PTS", allow_negative_numbers = true)]
    pub start_pts: Option<i64>,

    /// Read size in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    /// Frames or samples written back to back.
    Raw,
    /// RIFF WAVE, 16-bit PCM only.
    Wav,
}

impl Cli {
    /// Strict mode turns warnings into errors.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

#[test]
fn parses_extract_arguments() {
    let cli = Cli::parse_from([
        "esframed",
        "--strict",
        "extract",
        "in.pcm",
        "--output",
        "out.wav",
        "--format",
        "wav",
        "--pcm-channels",
        "6",
        "--start-pts",
        "-900",
    ]);

    assert_eq!(cli.fail_level(), log::Level::Warn);
    let Commands::Extract(args) = cli.command else {
        panic!("expected extract");
    };
    assert_eq!(args.format, OutputFormat::Wav);
    assert_eq!(args.pcm_channels, Some(6));
    assert_eq!(args.pcm_rate, 48000);
    assert_eq!(args.start_pts, Some(-900));
}

#[test]
fn rejects_out_of_range_pcm_rate() {
    for rate in ["0", "4294967295"] {
        let parsed = Cli::try_parse_from([
            "esframed",
            "extract",
            "in.pcm",
            "-o",
            "out.wav",
            "--pcm-rate",
            rate,
        ]);
        assert!(parsed.is_err(), "rate {rate} accepted");
    }
}
