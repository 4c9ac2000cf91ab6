//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;
use crate::domain::Platform;

/// Social Restore - Put social media exports back together.
///
/// Reunites exported media with its metadata, bakes captions and stickers
/// back in, restores capture dates and rebuilds message threads.
#[derive(Parser, Debug)]
#[command(name = "social-restore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use this config file instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore an export and write the result.
    Process {
        /// Export archive or document.
        input: PathBuf,

        /// Platform the export came from.
        #[arg(short, long, value_parser = parse_platform)]
        platform: Platform,

        /// Output file or directory (defaults to the current directory).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write preview thumbnails into this directory.
        #[arg(long)]
        previews: Option<PathBuf>,

        /// Never fetch remote overlay images.
        #[arg(long)]
        offline: bool,
    },

    /// Show the records found in an export without transforming anything.
    Inspect {
        /// Export archive or document.
        input: PathBuf,

        /// Platform the export came from.
        #[arg(short, long, value_parser = parse_platform)]
        platform: Platform,

        /// Output format: table or json.
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Maximum number of records to show (0 = all).
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// List supported platforms.
    Platforms,

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the default configuration file if none exists.
    Init,
    /// Print the effective configuration.
    Show,
    /// Print the configuration file path.
    Path,
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse()
}

impl Commands {
    /// Parse the output format argument of `inspect`.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        match self {
            Self::Inspect { format, .. } => format.parse(),
            _ => Ok(OutputFormat::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process() {
        let cli = Cli::parse_from([
            "social-restore",
            "process",
            "export.zip",
            "--platform",
            "snap",
            "-o",
            "out",
        ]);
        match cli.command {
            Commands::Process {
                platform, output, ..
            } => {
                assert_eq!(platform, Platform::Snapchat);
                assert_eq!(output, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_platform() {
        let parsed = Cli::try_parse_from(["social-restore", "inspect", "x.zip", "-p", "myspace"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_inspect_format() {
        let cli = Cli::parse_from(["social-restore", "-v", "inspect", "x.json", "-p", "x", "-f", "json"]);
        assert!(matches!(cli.command.output_format(), Ok(OutputFormat::Json)));
        assert_eq!(cli.verbose, 1);
    }
}
