//! Cascading configuration loader for the curve aligner, registry,
//! persistence store, and logging.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by every `spmid-*` crate without causing
//! circular dependency issues.
//!
//! # Usage
//!
//! ```rust,no_run
//! use spmid_config::SpmidConfig;
//!
//! let config = SpmidConfig::load().expect("failed to load config");
//!
//! println!("sampling rate: {}", config.curve_aligner.sampling_rate_ms);
//! println!("worker pool size: {}", config.registry.worker_pool_size);
//! println!("store path: {}", config.store.base_path.display());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/spmid/config.toml` (system)
//! 2. `~/.config/spmid/config.toml` (user)
//! 3. `./spmid.toml` (local override)
//! 4. Environment variables (`SPMID_*`, plus `RUST_LOG` for logging)
//!
//! # Example Config
//!
//! ```toml
//! [curve_aligner]
//! sampling_rate_ms = 1.0
//! time_range_threshold_ms = 1000.0
//! window_size_ratio = 0.5
//! distance_metric = "manhattan"
//! smooth_sigma = 1.0
//!
//! [registry]
//! worker_pool_size = 10
//!
//! [store]
//! base_path = "~/.local/share/spmid/store"
//!
//! [logging]
//! log_level = "info"
//! ```

pub mod infra;
pub mod loader;

pub use infra::{LoggingConfig, RegistryConfig, SpmidConfig};
pub use loader::ConfigSources;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl SpmidConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/spmid/config.toml`
    /// 3. `~/.config/spmid/config.toml`
    /// 4. `./spmid.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./spmid.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = SpmidConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# SPMID Configuration\n\n");

        output.push_str("[curve_aligner]\n");
        output.push_str(&format!("sampling_rate_ms = {}\n", self.curve_aligner.sampling_rate_ms));
        output.push_str(&format!(
            "time_range_threshold_ms = {}\n",
            self.curve_aligner.time_range_threshold_ms
        ));
        output.push_str(&format!("window_size_ratio = {}\n", self.curve_aligner.window_size_ratio));
        let metric = format!("{:?}", self.curve_aligner.distance_metric).to_lowercase();
        output.push_str(&format!("distance_metric = \"{}\"\n", metric));
        output.push_str(&format!("smooth_sigma = {}\n", self.curve_aligner.smooth_sigma));

        output.push_str("\n[registry]\n");
        if let Some(max) = self.registry.max_algorithms {
            output.push_str(&format!("max_algorithms = {}\n", max));
        }
        output.push_str(&format!("worker_pool_size = {}\n", self.registry.worker_pool_size));

        output.push_str("\n[store]\n");
        output.push_str(&format!("base_path = \"{}\"\n", self.store.base_path.display()));
        output.push_str(&format!("read_only = {}\n", self.store.read_only));

        output.push_str("\n[logging]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.logging.log_level));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SpmidConfig::default();
        assert_eq!(config.registry.worker_pool_size, 10);
        assert_eq!(config.curve_aligner.sampling_rate_ms, 1.0);
    }

    #[test]
    fn test_to_toml() {
        let config = SpmidConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[curve_aligner]"));
        assert!(toml.contains("[registry]"));
        assert!(toml.contains("[store]"));
        assert!(toml.contains("[logging]"));
    }

    #[test]
    fn test_load_defaults() {
        let config = SpmidConfig::load().unwrap();
        assert_eq!(config.registry.worker_pool_size, 10);
    }
}
