//! Grouped configuration structs for §6.4's recognized keys plus the
//! ambient persistence-store and logging settings (§1A). Kept in the same
//! grouped-struct shape the teacher used for its `PathsConfig`/`BindConfig`
//! split, each field serde-derived with an explicit default so a missing
//! file or section is a non-event.

use serde::{Deserialize, Serialize};
use spmid_align::CurveAlignerConfig;
use spmid_store::StoreConfig;

/// §6.4 "Registry": `{max_algorithms: optional usize = unbounded,
/// worker_pool_size: usize = 10}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub max_algorithms: Option<usize>,
    #[serde(default = "RegistryConfig::default_worker_pool_size")]
    pub worker_pool_size: usize,
}

impl RegistryConfig {
    fn default_worker_pool_size() -> usize {
        10
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_algorithms: None, worker_pool_size: Self::default_worker_pool_size() }
    }
}

/// §1A / §6.4 "Logging" (ambient expansion): forwarded to the `tracing`
/// subscriber installed by the binary entry point, mirroring the teacher's
/// `TelemetryConfig::log_level` / `RUST_LOG` precedent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_log_level")]
    pub log_level: String,
}

impl LoggingConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_level: Self::default_log_level() }
    }
}

/// Top-level recognized configuration (§6.4 plus ambient expansion groups).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpmidConfig {
    #[serde(default)]
    pub curve_aligner: CurveAlignerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default = "default_store")]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_store() -> StoreConfig {
    StoreConfig::default()
}

impl Default for SpmidConfig {
    fn default() -> Self {
        Self {
            curve_aligner: CurveAlignerConfig::default(),
            registry: RegistryConfig::default(),
            store: default_store(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_defaults_match_spec() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_algorithms, None);
        assert_eq!(config.worker_pool_size, 10);
    }

    #[test]
    fn logging_defaults_to_info() {
        assert_eq!(LoggingConfig::default().log_level, "info");
    }

    #[test]
    fn spmid_config_defaults_chain_through_groups() {
        let config = SpmidConfig::default();
        assert_eq!(config.curve_aligner.sampling_rate_ms, 1.0);
        assert_eq!(config.registry.worker_pool_size, 10);
        assert!(!config.store.read_only);
    }
}
