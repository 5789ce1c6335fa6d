//! Command line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use jobrelay::state_machine::{JobStatus, TargetType};

/// jobrelay: submit content for remote graph processing and track it to completion.
#[derive(Debug, Parser)]
#[command(name = "jobrelay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a config file (defaults to ./jobrelay.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Target type accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetArg {
    Image,
    Video,
    LocalFile,
    ExternalUrl,
    Text,
}

impl From<TargetArg> for TargetType {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Image => TargetType::Image,
            TargetArg::Video => TargetType::Video,
            TargetArg::LocalFile => TargetType::LocalFile,
            TargetArg::ExternalUrl => TargetType::ExternalUrl,
            TargetArg::Text => TargetType::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Queued,
    Uploaded,
    Processing,
    Success,
    Error,
}

impl From<StatusArg> for JobStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Queued => JobStatus::Queued,
            StatusArg::Uploaded => JobStatus::Uploaded,
            StatusArg::Processing => JobStatus::Processing,
            StatusArg::Success => JobStatus::Success,
            StatusArg::Error => JobStatus::Error,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a content item and make one registration attempt.
    Submit {
        /// URL, local file path, or inline text.
        target: String,

        /// What the target refers to.
        #[arg(long = "type", value_enum, default_value_t = TargetArg::ExternalUrl)]
        target_type: TargetArg,
    },

    /// Request chapter extraction for a podcast episode.
    Chapters {
        /// Stable episode identifier.
        episode_id: String,

        /// URL of the episode audio.
        audio_url: String,
    },

    /// Run the submit-or-retry and poll phases once.
    Run,

    /// Run the scheduler until interrupted.
    Serve {
        /// Seconds between ticks (overrides the config file).
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// List tracked jobs.
    Status {
        /// Only show jobs in this status.
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
}
