//! Command-line interface definitions

use crate::config::{AppConfig, StopMode};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Synchronized two-camera recording sessions
#[derive(Parser, Debug)]
#[command(name = "duocam", version, about)]
pub struct Cli {
    /// TOML config file
    #[arg(short, long, global = true, env = "DUOCAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record one session with both cameras
    Record(RecordArgs),

    /// Print the summary of a session report
    Inspect(InspectArgs),

    /// Validate a session name and list files it would overwrite
    CheckDestination(DestinationArgs),
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Session name, used for all output file names
    pub name: String,

    /// Directory for the session files
    #[arg(short, long)]
    pub save_path: Option<PathBuf>,

    /// Stop automatically after this many seconds (60-3600, step 30)
    #[arg(short, long)]
    pub timer: Option<u32>,

    /// Countdown before the cameras start (0-120 seconds)
    #[arg(long)]
    pub countdown: Option<u32>,

    /// Overwrite existing session files without asking
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path of a `<name>_data.txt` report
    pub report: PathBuf,

    /// Print all sections as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DestinationArgs {
    pub name: String,

    #[arg(short, long)]
    pub save_path: Option<PathBuf>,
}

impl RecordArgs {
    /// Apply flags over file values
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.save_path {
            config.save_path = path.clone();
        }
        if let Some(secs) = self.timer {
            config.stop_mode = StopMode::Timer;
            config.timer_duration_secs = secs;
        }
        if let Some(secs) = self.countdown {
            config.countdown_delay_secs = secs;
        }
    }
}

impl DestinationArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.save_path {
            config.save_path = path.clone();
        }
    }
}
