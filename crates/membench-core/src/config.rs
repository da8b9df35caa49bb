//! Benchmark configuration.
//!
//! Defaults reproduce the classic single-device run: device 0, 16 MiB of
//! `f32`, 32 host warm-ups, 16 device warm-ups, 100 timed round-trip copies
//! and a single timed host/device transfer per direction.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::ELEMENT_SIZE;
use crate::error::{BenchError, Result};
use crate::policy::ErrorPolicy;

/// Default transfer size in mebibytes.
pub const DEFAULT_TRANSFER_MB: usize = 16;

/// Bytes per mebibyte.
pub const MIB: usize = 1024 * 1024;

/// Profiler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Compute device ordinal.
    pub device_index: usize,
    /// Size in bytes of every buffer under test.
    pub transfer_bytes: usize,
    /// Untimed host-to-host copies before timing.
    pub host_warmup_iterations: u32,
    /// Untimed device round trips before timing.
    pub device_warmup_iterations: u32,
    /// Timed copies per leg for host-to-host and device-to-device.
    pub timed_iterations: u32,
    /// Timed copies per leg for host-to-device and device-to-host.
    pub transfer_iterations: u32,
    /// What to do on copy or timing failures.
    pub error_policy: ErrorPolicy,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            transfer_bytes: DEFAULT_TRANSFER_MB * MIB,
            host_warmup_iterations: 32,
            device_warmup_iterations: 16,
            timed_iterations: 100,
            transfer_iterations: 1,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl BenchConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::new()
    }

    /// Number of `f32` elements per buffer.
    pub fn element_count(&self) -> usize {
        self.transfer_bytes / ELEMENT_SIZE
    }

    /// Transfer size in whole mebibytes, as printed in the report header.
    pub fn transfer_mib(&self) -> usize {
        self.transfer_bytes / MIB
    }

    /// Check the configuration for values the profiler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.transfer_bytes == 0 {
            return Err(BenchError::InvalidConfig(
                "transfer_bytes must be greater than zero".to_string(),
            ));
        }
        if self.transfer_bytes % ELEMENT_SIZE != 0 {
            return Err(BenchError::InvalidConfig(format!(
                "transfer_bytes ({}) must be a multiple of {}",
                self.transfer_bytes, ELEMENT_SIZE
            )));
        }
        if self.timed_iterations == 0 {
            return Err(BenchError::InvalidConfig(
                "timed_iterations must be at least 1".to_string(),
            ));
        }
        if self.transfer_iterations == 0 {
            return Err(BenchError::InvalidConfig(
                "transfer_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a TOML document. Missing keys take their default values.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Builder for [`BenchConfig`].
#[derive(Debug, Clone, Default)]
pub struct BenchConfigBuilder {
    config: BenchConfig,
    size_overflow: Option<String>,
}

impl BenchConfigBuilder {
    /// Create a builder seeded with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: BenchConfig) -> Self {
        Self {
            config,
            size_overflow: None,
        }
    }

    /// Set the device ordinal.
    pub fn device_index(mut self, index: usize) -> Self {
        self.config.device_index = index;
        self
    }

    /// Set the transfer size in bytes.
    pub fn transfer_bytes(mut self, bytes: usize) -> Self {
        self.config.transfer_bytes = bytes;
        self.size_overflow = None;
        self
    }

    /// Set the transfer size in mebibytes.
    ///
    /// A size that does not fit in `usize` bytes is rejected by
    /// [`build`](Self::build).
    pub fn transfer_mib(self, mib: usize) -> Self {
        self.scaled_size(mib, MIB, "MiB")
    }

    /// Set the transfer size as an element count.
    pub fn element_count(self, count: usize) -> Self {
        self.scaled_size(count, ELEMENT_SIZE, "elements")
    }

    fn scaled_size(mut self, amount: usize, unit: usize, unit_name: &str) -> Self {
        match amount.checked_mul(unit) {
            Some(bytes) => {
                self.config.transfer_bytes = bytes;
                self.size_overflow = None;
            }
            None => {
                self.size_overflow = Some(format!(
                    "transfer size of {} {} overflows the addressable byte range",
                    amount, unit_name
                ));
            }
        }
        self
    }

    /// Set host-to-host warm-up copies.
    pub fn host_warmup_iterations(mut self, n: u32) -> Self {
        self.config.host_warmup_iterations = n;
        self
    }

    /// Set device warm-up round trips.
    pub fn device_warmup_iterations(mut self, n: u32) -> Self {
        self.config.device_warmup_iterations = n;
        self
    }

    /// Set timed copies per round-trip leg.
    pub fn timed_iterations(mut self, n: u32) -> Self {
        self.config.timed_iterations = n;
        self
    }

    /// Set timed copies per host/device leg.
    pub fn transfer_iterations(mut self, n: u32) -> Self {
        self.config.transfer_iterations = n;
        self
    }

    /// Set the error policy.
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<BenchConfig> {
        if let Some(reason) = self.size_overflow {
            return Err(BenchError::InvalidConfig(reason));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.device_index, 0);
        assert_eq!(config.transfer_bytes, 16_777_216);
        assert_eq!(config.element_count(), 4_194_304);
        assert_eq!(config.transfer_mib(), 16);
        assert_eq!(config.host_warmup_iterations, 32);
        assert_eq!(config.device_warmup_iterations, 16);
        assert_eq!(config.timed_iterations, 100);
        assert_eq!(config.transfer_iterations, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let zero = BenchConfig::builder().transfer_bytes(0).build();
        assert!(matches!(zero, Err(BenchError::InvalidConfig(_))));

        let odd = BenchConfig::builder().transfer_bytes(1023).build();
        assert!(matches!(odd, Err(BenchError::InvalidConfig(_))));

        let no_iters = BenchConfig::builder().timed_iterations(0).build();
        assert!(no_iters.is_err());

        let no_transfer_iters = BenchConfig::builder().transfer_iterations(0).build();
        assert!(no_transfer_iters.is_err());
    }

    #[test]
    fn test_oversized_transfer_rejected() {
        let result = BenchConfig::builder().transfer_mib(usize::MAX).build();
        assert!(matches!(result, Err(BenchError::InvalidConfig(msg)) if msg.contains("MiB")));

        let result = BenchConfig::builder().element_count(usize::MAX / 2).build();
        assert!(matches!(result, Err(BenchError::InvalidConfig(_))));

        // A later valid size replaces the rejected one
        let config = BenchConfig::builder()
            .transfer_mib(usize::MAX)
            .transfer_mib(2)
            .build()
            .unwrap();
        assert_eq!(config.transfer_bytes, 2 * MIB);
    }

    #[test]
    fn test_zero_warmup_allowed() {
        let config = BenchConfig::builder()
            .host_warmup_iterations(0)
            .device_warmup_iterations(0)
            .build()
            .unwrap();
        assert_eq!(config.host_warmup_iterations, 0);
    }

    #[test]
    fn test_builder() {
        let config = BenchConfig::builder()
            .device_index(1)
            .element_count(1024)
            .timed_iterations(10)
            .error_policy(ErrorPolicy::Continue)
            .build()
            .unwrap();
        assert_eq!(config.device_index, 1);
        assert_eq!(config.transfer_bytes, 4096);
        assert_eq!(config.timed_iterations, 10);
        assert_eq!(config.error_policy, ErrorPolicy::Continue);
    }

    #[test]
    fn test_toml_partial() {
        let config = BenchConfig::from_toml_str(
            r#"
            device_index = 2
            transfer_bytes = 65536
            error_policy = "continue"
            "#,
        )
        .unwrap();
        assert_eq!(config.device_index, 2);
        assert_eq!(config.transfer_bytes, 65536);
        assert_eq!(config.error_policy, ErrorPolicy::Continue);
        // Unspecified keys fall back to defaults
        assert_eq!(config.timed_iterations, 100);
    }

    #[test]
    fn test_toml_roundtrip_defaults() {
        let config = BenchConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = BenchConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_toml_invalid() {
        assert!(BenchConfig::from_toml_str("transfer_bytes = 3").is_err());
        assert!(BenchConfig::from_toml_str("transfer_bytes = \"big\"").is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timed_iterations = 5").unwrap();
        writeln!(file, "transfer_bytes = 4096").unwrap();

        let config = BenchConfig::load(file.path()).unwrap();
        assert_eq!(config.timed_iterations, 5);
        assert_eq!(config.element_count(), 1024);

        let missing = BenchConfig::load("/nonexistent/membench.toml");
        assert!(matches!(missing, Err(BenchError::Io(_))));
    }
}
