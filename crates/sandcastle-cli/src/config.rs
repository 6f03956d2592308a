use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sandcastle_runtime::SandboxConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "sandcastle.toml";

/// CLI settings
///
/// Environment overrides use the `SANDCASTLE__` prefix with `__` between
/// sections, e.g. `SANDCASTLE__SANDBOX__TIMEOUT_MS=250`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.sandbox
            .validate()
            .context("Invalid [sandbox] section")?;
        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level must not be empty");
        }
        Ok(())
    }
}

/// Load settings from an explicit file (which must exist), or from
/// `./sandcastle.toml` when present, then apply environment overrides.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    use config::{Config, Environment, File};

    let mut builder = Config::builder();
    match path {
        Some(p) => {
            builder = builder.add_source(File::from(p.to_path_buf()));
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }
    }
    builder = builder.add_source(
        Environment::with_prefix("SANDCASTLE")
            .try_parsing(true)
            .separator("__"),
    );

    let settings: Settings = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;
    settings.validate()?;
    Ok(settings)
}
