//! CLI command implementations.

pub mod config;
pub mod devices;
pub mod run;

use std::path::PathBuf;

use clap::Args;
use membench::{Backend, BenchConfig, BenchConfigBuilder, ErrorPolicy, RangeMode};

use crate::error::{CliError, CliResult};

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// The fixed-layout text report.
    Text,
    /// `SuiteReport` as pretty JSON.
    Json,
}

impl OutputFormat {
    /// Parse format from string.
    pub fn parse(s: &str) -> CliResult<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(CliError::InvalidArgument(format!(
                "Unknown format '{}'. Valid options: text, json",
                s
            ))),
        }
    }
}

/// Options shared by `run` and `config`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Backend to measure (auto, cuda, cpu)
    #[arg(short, long, default_value = "auto")]
    pub backend: String,

    /// Device ordinal
    #[arg(short, long)]
    pub device: Option<usize>,

    /// Buffer size in MiB
    #[arg(short, long, conflicts_with = "transfer_bytes")]
    pub size_mb: Option<usize>,

    /// Buffer size in bytes (multiple of 4)
    #[arg(long)]
    pub transfer_bytes: Option<usize>,

    /// Untimed host to host copies before timing
    #[arg(long)]
    pub host_warmup: Option<u32>,

    /// Untimed device round trips before timing
    #[arg(long)]
    pub device_warmup: Option<u32>,

    /// Timed copies per leg for host to host and device to device
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// Timed copies per leg for host/device transfers
    #[arg(long)]
    pub transfer_iterations: Option<u32>,

    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,

    /// Stop at the first copy or timer failure
    #[arg(long, conflicts_with = "continue_on_error")]
    pub halt_on_error: bool,

    /// Record copy and timer failures and keep measuring
    #[arg(long)]
    pub continue_on_error: bool,

    /// Profiler ranges around each phase (auto, nvtx, tracing, none)
    #[arg(long, default_value = "auto")]
    pub ranges: String,
}

impl RunArgs {
    /// Build the effective configuration: file values (or defaults) with
    /// flags layered on top.
    pub fn resolve_config(&self) -> CliResult<BenchConfig> {
        let base = match &self.config {
            Some(path) => BenchConfig::load(path)
                .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?,
            None => BenchConfig::default(),
        };

        let mut builder = BenchConfigBuilder::from_config(base);
        if let Some(device) = self.device {
            builder = builder.device_index(device);
        }
        if let Some(mb) = self.size_mb {
            builder = builder.transfer_mib(mb);
        }
        if let Some(bytes) = self.transfer_bytes {
            builder = builder.transfer_bytes(bytes);
        }
        if let Some(n) = self.host_warmup {
            builder = builder.host_warmup_iterations(n);
        }
        if let Some(n) = self.device_warmup {
            builder = builder.device_warmup_iterations(n);
        }
        if let Some(n) = self.iterations {
            builder = builder.timed_iterations(n);
        }
        if let Some(n) = self.transfer_iterations {
            builder = builder.transfer_iterations(n);
        }
        if self.halt_on_error {
            builder = builder.error_policy(ErrorPolicy::Halt);
        } else if self.continue_on_error {
            builder = builder.error_policy(ErrorPolicy::Continue);
        }

        Ok(builder.build()?)
    }

    /// Requested backend.
    pub fn backend(&self) -> CliResult<Backend> {
        Ok(Backend::parse(&self.backend)?)
    }

    /// Requested profiler ranges.
    pub fn ranges(&self) -> CliResult<RangeMode> {
        Ok(RangeMode::parse(&self.ranges)?)
    }

    /// Requested output format.
    pub fn format(&self) -> CliResult<OutputFormat> {
        OutputFormat::parse(&self.format)
    }
}
