use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use subdec::process::extract::Framing;
use subdec::structs::params::SubtitleType;

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = env!("SUBDECD_LONG_VERSION"),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting and decoding broadcast and disc subtitle streams",
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
    /// Decode a subtitle stream into bitmaps and a YAML item index.
    Decode(DecodeArgs),

    /// Print per-type record statistics.
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input subtitle stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Subtitle format of the input.
    #[arg(long = "type", value_enum)]
    pub kind: StreamKind,

    /// Output directory for bitmaps and the item index.
    #[arg(long, value_name = "DIR")]
    pub output_path: Option<PathBuf>,

    /// DVB composition page id (any page when omitted).
    #[arg(long, value_name = "ID")]
    pub composition_id: Option<u16>,

    /// DVB ancillary page id (any page when omitted).
    #[arg(long, value_name = "ID")]
    pub ancillary_id: Option<u16>,

    /// Teletext subtitle page, e.g. 888.
    #[arg(long, value_name = "PAGE", default_value_t = 888, value_parser = clap::value_parser!(u16).range(100..=899))]
    pub teletext_page: u16,

    /// Closed caption channel (1-4).
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub caption_channel: u8,

    /// Quarter exactly 1920x1080 PGS bitmaps.
    #[arg(long)]
    pub pgs_crop_quirk: bool,

    /// Emit teletext pages as text instead of bitmaps.
    #[arg(long)]
    pub text_mode: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input subtitle stream.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Subtitle format of the input (detected from the first bytes when
    /// omitted).
    #[arg(long = "type", value_enum)]
    pub kind: Option<StreamKind>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum StreamKind {
    /// DVB bitmap subtitles.
    Dvb,
    /// Blu-ray presentation graphics (SUP).
    Pgs,
    /// DVD sub-pictures.
    Vob,
    /// Matroska VobSub.
    MkvVob,
    /// DVB teletext.
    Teletext,
    /// CEA-608 closed captions.
    Cc,
    /// Plain UTF-8 text.
    Text,
    /// SSA/ASS events.
    Ssa,
    /// Timed text.
    TimedText,
}

impl StreamKind {
    pub fn subtitle_type(self) -> SubtitleType {
        match self {
            StreamKind::Dvb => SubtitleType::Dvb,
            StreamKind::Pgs => SubtitleType::Pgs,
            StreamKind::Vob => SubtitleType::Vob,
            StreamKind::MkvVob => SubtitleType::MkvVob,
            StreamKind::Teletext => SubtitleType::DvbTeletext,
            StreamKind::Cc => SubtitleType::ClosedCaption,
            StreamKind::Text => SubtitleType::MkvStr,
            StreamKind::Ssa => SubtitleType::Ssa,
            StreamKind::TimedText => SubtitleType::TimedText,
        }
    }

    pub fn framing(self) -> Framing {
        match self {
            StreamKind::Pgs => Framing::Sup,
            _ => Framing::Record,
        }
    }
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
    /// Timestamped human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

impl Cli {
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}
