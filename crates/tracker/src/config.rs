use std::path::Path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    pub input: InputConfig,
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Largest log accepted, in bytes
    pub max_log_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    pub strip_ansi: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Substitute storage defaults (0.0 / 0) for unset fields
    pub fill_defaults: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON array for the whole batch
    Json,
    /// One JSON object per line
    Jsonl,
    /// Human-readable table
    Table,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl TrackerConfig {
    /// Load configuration from tracker.toml and environment variables
    ///
    /// Priority: Environment Variables > explicit file > default file locations > Defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&TrackerConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder()
            .add_source(defaults);

        // 1. /etc/tracker/tracker.toml (system-wide)
        // 2. config/tracker.toml (working directory)
        for path in ["/etc/tracker/tracker", "config/tracker"] {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        if let Some(path) = explicit {
            tracing::debug!("Using configuration file: {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // Use double underscore for nested keys: TRACKER_INPUT__MAX_LOG_BYTES
        builder = builder.add_source(
            config::Environment::with_prefix("TRACKER")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.max_log_bytes == 0 {
            anyhow::bail!("input.max_log_bytes must be > 0");
        }
        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level must not be empty");
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                max_log_bytes: 64 * 1024 * 1024,
            },
            extraction: ExtractionConfig {
                strip_ansi: true,
            },
            output: OutputConfig {
                format: OutputFormat::Json,
                fill_defaults: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}
