//! CLI arguments and subcommands for herakles-process-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-process-exporter",
    about = "Prometheus exporter for per-group process CPU, I/O, page-fault and memory metrics",
    long_about = "Prometheus exporter for per-group process metrics.\n\n\
                  Tracks every process across scans of /proc, classifies it into a named group \
                  and exports group totals. Cumulative counters never go backwards, even when \
                  member processes exit or their pids are reused.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-process-exporter — More info: https://www.herakles.now — Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print only the loaded user config file + full path and exit
    #[arg(long)]
    pub show_user_config: bool,

    /// Output format for --show-config*
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Root of the procfs tree to scan
    #[arg(long)]
    pub procfs_root: Option<PathBuf>,

    /// Seconds between sampling cycles
    #[arg(short = 'i', long)]
    pub update_interval: Option<u64>,

    /// Put child processes into their parent's group
    #[arg(long, conflicts_with = "no_track_children")]
    pub track_children: bool,

    /// Classify child processes on their own
    #[arg(long, conflicts_with = "track_children")]
    pub no_track_children: bool,

    /// Include only processes matching these names (comma-separated)
    #[arg(long)]
    pub include_names: Option<String>,

    /// Exclude processes matching these names (comma-separated)
    #[arg(long)]
    pub exclude_names: Option<String>,

    /// Ignore unmatched processes instead of grouping them as "other"
    #[arg(long)]
    pub disable_others: bool,

    /// Additional group rules file (TOML)
    #[arg(short = 'g', long)]
    pub groups_file: Option<PathBuf>,

    /// Parallel processing threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Path to JSON test data file (uses recorded observations instead of /proc)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check {
        /// Check /proc filesystem
        #[arg(long)]
        proc: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// List group rules
    Groups {
        /// Show detailed matching rules
        #[arg(long)]
        verbose: bool,

        /// Filter by group name
        #[arg(short = 'g', long)]
        group: Option<String>,
    },

    /// Run sampling cycles and print the resulting groups
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 2)]
        iterations: usize,

        /// Seconds to wait between iterations
        #[arg(long, default_value_t = 1)]
        interval: u64,

        /// Show newly discovered processes
        #[arg(long)]
        verbose: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let args = Args::parse_from(["herakles-process-exporter"]);
        assert!(args.command.is_none());
        assert!(args.port.is_none());
        assert!(!args.track_children);
        assert!(!args.disable_others);
    }

    #[test]
    fn test_parse_test_subcommand() {
        let args = Args::parse_from(["herakles-process-exporter", "test", "-n", "3", "--verbose"]);
        match args.command {
            Some(Commands::Test {
                iterations,
                verbose,
                interval,
            }) => {
                assert_eq!(iterations, 3);
                assert!(verbose);
                assert_eq!(interval, 1);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_track_children_flags_conflict() {
        let res = Args::try_parse_from([
            "herakles-process-exporter",
            "--track-children",
            "--no-track-children",
        ]);
        assert!(res.is_err());
    }
}
