use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use kill_monitor::{OutputFormat, enabler::DEFAULT_WATCH_INTERVAL};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "/etc/killtracer/killtracer.ini";
const DEFAULT_PROC_DIR: &str = "/proc";

/// Section of the configuration file holding our settings.
pub const SECTION: &str = "killtracer";

/// Raw key/value pairs of one section of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct SectionConfig {
    inner: HashMap<String, String>,
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("{value} is not a valid value for field {field}: {err}")]
    InvalidValue {
        field: String,
        value: String,
        err: String,
    },
}

impl SectionConfig {
    /// Inserts a new configuration value.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.inner.insert(key, value)
    }

    /// Returns an optional typed configuration value.
    pub fn optional<T>(&self, config_name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .map(|value| parse(value, config_name))
            .transpose()
    }

    /// Returns a typed configuration value, or `default` if missing.
    pub fn with_default<T>(&self, config_name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        Ok(self.optional(config_name)?.unwrap_or(default))
    }
}

fn parse<T>(value: &str, config_name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    T::from_str(value.trim()).map_err(|err| ConfigError::InvalidValue {
        field: config_name.to_string(),
        value: value.to_string(),
        err: err.to_string(),
    })
}

/// Settings of the kill tracer.
#[derive(Debug, Clone)]
pub struct KillTracerConfig {
    /// Tracefs mount point. Detected at startup when missing.
    pub tracefs_dir: Option<PathBuf>,
    pub proc_dir: PathBuf,
    pub watch_interval: Duration,
    pub output_format: OutputFormat,
    /// Print events on stdout, in addition to logging them.
    pub console: bool,
}

impl Default for KillTracerConfig {
    fn default() -> Self {
        Self {
            tracefs_dir: None,
            proc_dir: PathBuf::from(DEFAULT_PROC_DIR),
            watch_interval: DEFAULT_WATCH_INTERVAL,
            output_format: OutputFormat::default(),
            console: true,
        }
    }
}

impl TryFrom<&SectionConfig> for KillTracerConfig {
    type Error = ConfigError;

    fn try_from(config: &SectionConfig) -> Result<Self, Self::Error> {
        let watch_interval: u64 =
            config.with_default("watch_interval", DEFAULT_WATCH_INTERVAL.as_secs())?;
        if watch_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch_interval".to_string(),
                value: watch_interval.to_string(),
                err: "must be at least one second".to_string(),
            });
        }

        Ok(Self {
            tracefs_dir: config.optional("tracefs_dir")?,
            proc_dir: config.with_default("proc_dir", PathBuf::from(DEFAULT_PROC_DIR))?,
            watch_interval: Duration::from_secs(watch_interval),
            output_format: config.with_default("output_format", OutputFormat::default())?,
            console: config.with_default("console", true)?,
        })
    }
}

impl KillTracerConfig {
    /// Load the configuration from a custom file, which must exist, or from
    /// the default file if present.
    pub fn load(custom_file: Option<&str>) -> Result<Self> {
        let config_file = match custom_file {
            Some(custom_file) => {
                let config_file = PathBuf::from(custom_file);
                if !config_file.exists() {
                    bail!("Configuration file {} not found", config_file.display());
                }
                config_file
            }
            None => {
                let config_file = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !config_file.exists() {
                    log::debug!("No configuration file found, using defaults");
                    return Ok(Self::default());
                }
                config_file
            }
        };
        Self::from_config_file(&config_file)
    }

    fn from_config_file(config_file: &Path) -> Result<Self> {
        let conf = ini::Ini::load_from_file(config_file)
            .with_context(|| format!("Error loading configuration from {config_file:?}"))?;

        let mut section = SectionConfig::default();
        if let Some(prop) = conf.section(Some(SECTION)) {
            for (key, value) in prop.iter() {
                log::debug!("{}.{}={}", SECTION, key, value);
                section.insert(key.to_string(), value.to_string());
            }
        }

        Self::try_from(&section)
            .with_context(|| format!("Invalid configuration in {config_file:?}"))
    }
}
