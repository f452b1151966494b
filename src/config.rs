//! Configuration management for herakles-process-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use herakles_process_exporter::process::{ClassifierError, GroupMatcher, NameFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9256;
pub const DEFAULT_UPDATE_INTERVAL: u64 = 15;
pub const DEFAULT_PROCFS_ROOT: &str = "/proc";

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Sampling
    #[serde(alias = "procfs-root")]
    pub procfs_root: Option<PathBuf>,
    #[serde(alias = "update-interval-secs")]
    pub update_interval_secs: Option<u64>,
    pub parallelism: Option<usize>,

    // Classification
    pub include_names: Option<Vec<String>>,
    pub exclude_names: Option<Vec<String>>,
    /// If true, ignore processes no rule matches instead of grouping them as "other"
    #[serde(alias = "disable-others")]
    pub disable_others: Option<bool>,
    /// Children of tracked processes join their parent's group
    #[serde(alias = "track-children")]
    pub track_children: Option<bool>,
    /// Extra TOML rules file, loaded after the built-in rules
    #[serde(alias = "groups-file")]
    pub groups_file: Option<PathBuf>,

    // Feature flags
    pub enable_health: Option<bool>,

    /// Path to JSON test data file (uses recorded observations instead of /proc)
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            procfs_root: Some(PathBuf::from(DEFAULT_PROCFS_ROOT)),
            update_interval_secs: Some(DEFAULT_UPDATE_INTERVAL),
            parallelism: None,
            include_names: None,
            exclude_names: None,
            disable_others: Some(false),
            track_children: Some(true),
            groups_file: None,
            enable_health: Some(true),
            test_data_file: None,
        }
    }
}

impl Config {
    pub fn name_filter(&self) -> NameFilter {
        NameFilter {
            include: self.include_names.clone(),
            exclude: self.exclude_names.clone(),
        }
    }

    /// Loads group rules and applies the name filter and "other" bucket settings.
    pub fn group_matcher(&self) -> Result<GroupMatcher, ClassifierError> {
        Ok(GroupMatcher::load(self.groups_file.as_deref())?
            .with_filter(self.name_filter())
            .with_others(!self.disable_others.unwrap_or(false)))
    }

    pub fn procfs_root(&self) -> PathBuf {
        self.procfs_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROCFS_ROOT))
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.port == Some(0) {
        return Err("port must be greater than 0".into());
    }

    if let Some(bind) = cfg.bind.as_deref() {
        if bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address '{}'", bind).into());
        }
    }

    if cfg.update_interval_secs == Some(0) {
        return Err("update_interval_secs must be at least 1".into());
    }

    if let Some(file) = cfg.groups_file.as_deref() {
        if !file.exists() {
            return Err(format!("Group rules file not found: {}", file.display()).into());
        }
    }

    if let Some(file) = cfg.test_data_file.as_deref() {
        if !file.exists() {
            return Err(format!("Test data file not found: {}", file.display()).into());
        }
    }

    if let Some(include) = &cfg.include_names {
        if include.iter().any(|s| s.is_empty()) {
            return Err("include_names must not contain empty entries".into());
        }
    }

    Ok(())
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if args.disable_health {
        config.enable_health = Some(false);
    }

    if let Some(root) = &args.procfs_root {
        config.procfs_root = Some(root.clone());
    }
    if let Some(secs) = args.update_interval {
        config.update_interval_secs = Some(secs);
    }
    if let Some(threads) = args.parallelism {
        config.parallelism = Some(threads);
    }

    // Parse comma-separated include/exclude names
    if let Some(include_str) = &args.include_names {
        config.include_names = Some(split_names(include_str));
    }
    if let Some(exclude_str) = &args.exclude_names {
        config.exclude_names = Some(split_names(exclude_str));
    }

    if args.disable_others {
        config.disable_others = Some(true);
    }
    if args.track_children {
        config.track_children = Some(true);
    }
    if args.no_track_children {
        config.track_children = Some(false);
    }
    if let Some(file) = &args.groups_file {
        config.groups_file = Some(file.clone());
    }

    // Test data file: CLI wins if provided
    if let Some(test_file) = &args.test_data_file {
        config.test_data_file = Some(test_file.clone());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/process-exporter.yaml",
            "/etc/herakles/process-exporter.yml",
            "/etc/herakles/process-exporter.json",
            "/etc/herakles/process-exporter.toml",
            "./herakles-process-exporter.yaml",
            "./herakles-process-exporter.yml",
            "./herakles-process-exporter.json",
            "./herakles-process-exporter.toml",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
    user_config: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}
