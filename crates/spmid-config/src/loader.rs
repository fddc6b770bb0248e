//! Config file discovery, loading, and environment variable overlay.

use std::env;
use std::path::{Path, PathBuf};

use crate::infra::{LoggingConfig, RegistryConfig, SpmidConfig};
use crate::ConfigError;
use spmid_align::{CurveAlignerConfig, DistanceMetric};
use spmid_store::StoreConfig;

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations (system, user, local).
/// Returns paths in load order. Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/spmid/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("spmid/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("spmid.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<SpmidConfig, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead { path: path.to_path_buf(), source: e })?;
    parse_toml(&contents, path)
}

fn parse_distance_metric(s: &str) -> Option<DistanceMetric> {
    match s {
        "euclidean" => Some(DistanceMetric::Euclidean),
        "manhattan" => Some(DistanceMetric::Manhattan),
        "chebyshev" => Some(DistanceMetric::Chebyshev),
        "gradient" => Some(DistanceMetric::Gradient),
        _ => None,
    }
}

/// Parse config from a TOML string. Unknown sections/keys are ignored
/// rather than rejected, so older config files remain loadable as new
/// keys are added.
fn parse_toml(contents: &str, path: &Path) -> Result<SpmidConfig, ConfigError> {
    let table: toml::Table =
        contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse { path: path.to_path_buf(), message: e.to_string() })?;

    let mut config = SpmidConfig::default();

    if let Some(section) = table.get("curve_aligner").and_then(|v| v.as_table()) {
        if let Some(v) = section.get("sampling_rate_ms").and_then(|v| v.as_float()) {
            config.curve_aligner.sampling_rate_ms = v;
        }
        if let Some(v) = section.get("time_range_threshold_ms").and_then(|v| v.as_float()) {
            config.curve_aligner.time_range_threshold_ms = v;
        }
        if let Some(v) = section.get("window_size_ratio").and_then(|v| v.as_float()) {
            config.curve_aligner.window_size_ratio = v;
        }
        if let Some(v) = section.get("smooth_sigma").and_then(|v| v.as_float()) {
            config.curve_aligner.smooth_sigma = v;
        }
        if let Some(v) = section.get("distance_metric").and_then(|v| v.as_str()).and_then(parse_distance_metric) {
            config.curve_aligner.distance_metric = v;
        }
    }

    if let Some(section) = table.get("registry").and_then(|v| v.as_table()) {
        if let Some(v) = section.get("max_algorithms").and_then(|v| v.as_integer()) {
            config.registry.max_algorithms = Some(v as usize);
        }
        if let Some(v) = section.get("worker_pool_size").and_then(|v| v.as_integer()) {
            config.registry.worker_pool_size = v as usize;
        }
    }

    if let Some(section) = table.get("store").and_then(|v| v.as_table()) {
        if let Some(v) = section.get("base_path").and_then(|v| v.as_str()) {
            config.store.base_path = expand_path(v);
        }
        if let Some(v) = section.get("read_only").and_then(|v| v.as_bool()) {
            config.store.read_only = v;
        }
    }

    if let Some(section) = table.get("logging").and_then(|v| v.as_table()) {
        if let Some(v) = section.get("log_level").and_then(|v| v.as_str()) {
            config.logging.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Merge two configs, with `overlay` taking precedence field-by-field
/// (a field that still matches its compiled default in `overlay` is
/// assumed unset and `base`'s value wins).
pub fn merge_configs(base: SpmidConfig, overlay: SpmidConfig) -> SpmidConfig {
    let default_curve = CurveAlignerConfig::default();
    let default_registry = RegistryConfig::default();
    let default_store = StoreConfig::default();
    let default_logging = LoggingConfig::default();

    SpmidConfig {
        curve_aligner: CurveAlignerConfig {
            sampling_rate_ms: if overlay.curve_aligner.sampling_rate_ms != default_curve.sampling_rate_ms {
                overlay.curve_aligner.sampling_rate_ms
            } else {
                base.curve_aligner.sampling_rate_ms
            },
            time_range_threshold_ms: if overlay.curve_aligner.time_range_threshold_ms != default_curve.time_range_threshold_ms {
                overlay.curve_aligner.time_range_threshold_ms
            } else {
                base.curve_aligner.time_range_threshold_ms
            },
            window_size_ratio: if overlay.curve_aligner.window_size_ratio != default_curve.window_size_ratio {
                overlay.curve_aligner.window_size_ratio
            } else {
                base.curve_aligner.window_size_ratio
            },
            distance_metric: if overlay.curve_aligner.distance_metric != default_curve.distance_metric {
                overlay.curve_aligner.distance_metric
            } else {
                base.curve_aligner.distance_metric
            },
            smooth_sigma: if overlay.curve_aligner.smooth_sigma != default_curve.smooth_sigma {
                overlay.curve_aligner.smooth_sigma
            } else {
                base.curve_aligner.smooth_sigma
            },
        },
        registry: RegistryConfig {
            max_algorithms: if overlay.registry.max_algorithms != default_registry.max_algorithms {
                overlay.registry.max_algorithms
            } else {
                base.registry.max_algorithms
            },
            worker_pool_size: if overlay.registry.worker_pool_size != default_registry.worker_pool_size {
                overlay.registry.worker_pool_size
            } else {
                base.registry.worker_pool_size
            },
        },
        store: StoreConfig {
            base_path: if overlay.store.base_path != default_store.base_path {
                overlay.store.base_path
            } else {
                base.store.base_path
            },
            read_only: if overlay.store.read_only != default_store.read_only {
                overlay.store.read_only
            } else {
                base.store.read_only
            },
        },
        logging: LoggingConfig {
            log_level: if overlay.logging.log_level != default_logging.log_level {
                overlay.logging.log_level
            } else {
                base.logging.log_level
            },
        },
    }
}

/// Apply environment variable overrides to config. Env vars win over every
/// file source (§1A: "... environment variable overrides (`SPMID_*`)").
pub fn apply_env_overrides(config: &mut SpmidConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("SPMID_CURVE_SAMPLING_RATE_MS") {
        if let Ok(parsed) = v.parse() {
            config.curve_aligner.sampling_rate_ms = parsed;
            sources.env_overrides.push("SPMID_CURVE_SAMPLING_RATE_MS".to_string());
        }
    }
    if let Ok(v) = env::var("SPMID_CURVE_TIME_RANGE_THRESHOLD_MS") {
        if let Ok(parsed) = v.parse() {
            config.curve_aligner.time_range_threshold_ms = parsed;
            sources.env_overrides.push("SPMID_CURVE_TIME_RANGE_THRESHOLD_MS".to_string());
        }
    }
    if let Ok(v) = env::var("SPMID_CURVE_WINDOW_SIZE_RATIO") {
        if let Ok(parsed) = v.parse() {
            config.curve_aligner.window_size_ratio = parsed;
            sources.env_overrides.push("SPMID_CURVE_WINDOW_SIZE_RATIO".to_string());
        }
    }
    if let Ok(v) = env::var("SPMID_CURVE_SMOOTH_SIGMA") {
        if let Ok(parsed) = v.parse() {
            config.curve_aligner.smooth_sigma = parsed;
            sources.env_overrides.push("SPMID_CURVE_SMOOTH_SIGMA".to_string());
        }
    }
    if let Ok(v) = env::var("SPMID_CURVE_DISTANCE_METRIC") {
        if let Some(parsed) = parse_distance_metric(&v.to_lowercase()) {
            config.curve_aligner.distance_metric = parsed;
            sources.env_overrides.push("SPMID_CURVE_DISTANCE_METRIC".to_string());
        }
    }

    if let Ok(v) = env::var("SPMID_REGISTRY_MAX_ALGORITHMS") {
        if let Ok(parsed) = v.parse() {
            config.registry.max_algorithms = Some(parsed);
            sources.env_overrides.push("SPMID_REGISTRY_MAX_ALGORITHMS".to_string());
        }
    }
    if let Ok(v) = env::var("SPMID_REGISTRY_WORKER_POOL_SIZE") {
        if let Ok(parsed) = v.parse() {
            config.registry.worker_pool_size = parsed;
            sources.env_overrides.push("SPMID_REGISTRY_WORKER_POOL_SIZE".to_string());
        }
    }

    if let Ok(v) = env::var("SPMID_STORE_PATH") {
        config.store.base_path = expand_path(&v);
        sources.env_overrides.push("SPMID_STORE_PATH".to_string());
    }
    if let Ok(v) = env::var("SPMID_STORE_READONLY") {
        config.store.read_only = v.to_lowercase() == "true" || v == "1";
        sources.env_overrides.push("SPMID_STORE_READONLY".to_string());
    }

    if let Ok(v) = env::var("SPMID_LOG_LEVEL") {
        config.logging.log_level = v;
        sources.env_overrides.push("SPMID_LOG_LEVEL".to_string());
    }
    // Also support the standard RUST_LOG, mirroring the teacher's precedent.
    if let Ok(v) = env::var("RUST_LOG") {
        config.logging.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand `~` and leading `$VAR` references in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }
    if let Some(stripped) = path.strip_prefix('$') {
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
            return PathBuf::from(path);
        }
        return env::var(stripped).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(path));
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn expand_path_absolute_is_untouched() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn discover_config_files_does_not_panic() {
        let _files = discover_config_files();
    }

    #[test]
    fn parse_minimal_toml_leaves_other_groups_at_default() {
        let toml = "[curve_aligner]\nsampling_rate_ms = 2.5\n";
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.curve_aligner.sampling_rate_ms, 2.5);
        assert_eq!(config.registry.worker_pool_size, 10);
    }

    #[test]
    fn parse_full_toml_populates_every_group() {
        let toml = r#"
[curve_aligner]
sampling_rate_ms = 2.0
time_range_threshold_ms = 800.0
window_size_ratio = 0.25
distance_metric = "euclidean"
smooth_sigma = 0.5

[registry]
max_algorithms = 16
worker_pool_size = 4

[store]
base_path = "/data/spmid-store"
read_only = true

[logging]
log_level = "debug"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.curve_aligner.sampling_rate_ms, 2.0);
        assert_eq!(config.curve_aligner.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(config.registry.max_algorithms, Some(16));
        assert_eq!(config.registry.worker_pool_size, 4);
        assert_eq!(config.store.base_path, PathBuf::from("/data/spmid-store"));
        assert!(config.store.read_only);
        assert_eq!(config.logging.log_level, "debug");
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = SpmidConfig::default();
        let mut sources = ConfigSources::default();
        env::set_var("SPMID_LOG_LEVEL", "trace");
        apply_env_overrides(&mut config, &mut sources);
        env::remove_var("SPMID_LOG_LEVEL");
        assert_eq!(config.logging.log_level, "trace");
        assert!(sources.env_overrides.contains(&"SPMID_LOG_LEVEL".to_string()));
    }
}
