//! Tracing subscriber installation for the binary entry point (§6.4
//! "Logging"), mirroring the teacher's `telemetry::init` precedent but
//! scoped to what this core actually needs: a leveled, structured sink,
//! not a full OTLP pipeline (out of scope here, §1).

use anyhow::{Context, Result};
use spmid_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber at `config.log_level`, honoring
/// `RUST_LOG` if set (the env var always wins — see
/// `spmid_config::loader::apply_env_overrides`, which already folds
/// `RUST_LOG` into `log_level` before this runs).
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;

    tracing_subscriber::fmt().with_env_filter(filter).try_init().map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
