use ipnet::IpNet;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use burstrx_common::DEFAULT_MAX_BURST;

use crate::cursor::WordSize;
use crate::error::ConfigError;
use crate::inspect::DEFAULT_TRACKED_DESTINATIONS;
use crate::region::BatchLayout;

/// Application configuration, loadable from CLI or YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Most packets a single receive call may report.
    #[serde(default = "default_max_burst")]
    pub max_burst: usize,

    /// Bytes between the count field and the descriptor array.
    #[serde(default)]
    pub header_gap: usize,

    /// Descriptor word width in bytes (4 or 8). Defaults to the host's.
    #[serde(default = "default_word_size")]
    pub word_size: usize,

    /// Pause before retrying after a transient receive failure.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// API server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Quiet mode (suppress non-error logs).
    #[serde(default)]
    pub quiet: bool,

    /// Seconds between throughput reports. 0 = disabled.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,

    /// Destination networks the firewall drops.
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<IpNet>,

    /// Most destinations the firewall keeps individual drop counts for.
    #[serde(default = "default_drop_tracking_limit")]
    pub drop_tracking_limit: usize,

    /// Seconds without a drop before a destination's count is forgotten.
    #[serde(default = "default_drop_timeout")]
    pub drop_timeout_seconds: u64,

    /// List of CIDRs allowed to access the API (empty = allow all).
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

/// Parameters of the software burst source.
#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticConfig {
    /// Upper bound on packets per burst (also capped by `max_burst`).
    #[serde(default = "default_synthetic_max_batch")]
    pub max_batch: usize,

    /// Fixed RNG seed for reproducible traffic.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Every Nth receive call returns an empty burst. 0 = never.
    #[serde(default)]
    pub idle_every: u64,

    /// Time each receive call blocks before returning its burst.
    #[serde(default = "default_synthetic_interval_ms")]
    pub interval_ms: u64,
}

fn default_max_burst() -> usize {
    DEFAULT_MAX_BURST
}

fn default_word_size() -> usize {
    WordSize::native().bytes()
}

fn default_retry_delay_ms() -> u64 {
    1
}

fn default_port() -> u16 {
    3000
}

fn default_stats_interval() -> u64 {
    1
}

fn default_blacklist() -> Vec<IpNet> {
    // Nothing legitimate is ever addressed to 0.0.0.0 or 0.0.0.1.
    ["0.0.0.0/32", "0.0.0.1/32"]
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn default_drop_tracking_limit() -> usize {
    DEFAULT_TRACKED_DESTINATIONS
}

fn default_drop_timeout() -> u64 {
    300
}

fn default_synthetic_max_batch() -> usize {
    32
}

fn default_synthetic_interval_ms() -> u64 {
    100
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            max_batch: default_synthetic_max_batch(),
            seed: None,
            idle_every: 0,
            interval_ms: default_synthetic_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_burst: default_max_burst(),
            header_gap: 0,
            word_size: default_word_size(),
            retry_delay_ms: default_retry_delay_ms(),
            port: default_port(),
            quiet: false,
            stats_interval_seconds: default_stats_interval(),
            blacklist: default_blacklist(),
            drop_tracking_limit: default_drop_tracking_limit(),
            drop_timeout_seconds: default_drop_timeout(),
            allowed_ips: Vec::new(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Merge CLI args into config (CLI takes precedence).
    pub fn merge_cli(&mut self, cli: &CliArgs) {
        if cli.port != 3000 {
            self.port = cli.port;
        }
        if cli.quiet {
            self.quiet = true;
        }
        if let Some(max_burst) = cli.max_burst {
            self.max_burst = max_burst;
        }
        if let Some(word_size) = cli.word_size {
            self.word_size = word_size;
        }
        if let Some(gap) = cli.header_gap {
            self.header_gap = gap;
        }
        if let Some(interval) = cli.stats_interval {
            self.stats_interval_seconds = interval;
        }
        if !cli.blacklist.is_empty() {
            self.blacklist = cli.blacklist.clone();
        }
        if !cli.allowed_ips.is_empty() {
            self.allowed_ips = cli.allowed_ips.clone();
        }
        if cli.seed.is_some() {
            self.synthetic.seed = cli.seed;
        }
        if let Some(max_batch) = cli.max_batch {
            self.synthetic.max_batch = max_batch;
        }
    }

    /// Validated region layout.
    pub fn layout(&self) -> Result<BatchLayout, ConfigError> {
        if self.max_burst == 0 || self.max_burst > usize::from(u16::MAX) {
            return Err(ConfigError::MaxBurst { got: self.max_burst });
        }
        let word_size =
            WordSize::from_bytes(self.word_size).ok_or(ConfigError::WordSize(self.word_size))?;
        let layout = BatchLayout {
            max_burst: self.max_burst,
            header_gap: self.header_gap,
            word_size,
        };
        if layout.region_len().is_none() {
            return Err(ConfigError::HeaderGap { got: self.header_gap });
        }
        Ok(layout)
    }
}

use clap::Parser;

/// burstrx: burst-receive packet ingestion front end
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Port to serve the stats API on.
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Path to YAML config file.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Quiet mode (suppress non-error logs).
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Most packets a single receive call may report.
    #[arg(long)]
    pub max_burst: Option<usize>,

    /// Descriptor word width in bytes (4 or 8).
    #[arg(long)]
    pub word_size: Option<usize>,

    /// Bytes between the count field and the descriptor array.
    #[arg(long)]
    pub header_gap: Option<usize>,

    /// Seconds between throughput reports (0 = disabled).
    #[arg(long)]
    pub stats_interval: Option<u64>,

    /// Destination CIDR to drop (e.g., 192.0.2.0/24). Repeat for multiple.
    #[arg(long)]
    pub blacklist: Vec<IpNet>,

    /// IP CIDRs allowed to access the API (e.g., 10.0.0.0/8). Repeat for multiple.
    #[arg(long)]
    pub allowed_ips: Vec<String>,

    /// Seed for the synthetic burst source.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Upper bound on packets per synthetic burst.
    #[arg(long)]
    pub max_batch: Option<usize>,
}
