//! Pipeline configuration
//!
//! Values are resolved from the command line, then the TOML configuration
//! file, then built-in defaults. The file is either given explicitly or
//! discovered at `<config dir>/Mayhem/mayhem.toml`.

use super::args::Args;
use crate::core::error_handling::ContextualError;
use crate::core::logging::LogFormat;
use crate::core::retry::RetryPolicy;
use crate::pipeline::{DelayRange, FailureProbability, PipelineSettings, RunMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "Mayhem";
const CONFIG_FILE_NAME: &str = "mayhem.toml";

/// Upper bound on extra attempts for a failed host restart
pub const MAX_ACTION_RETRIES: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Could not read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, Self::Read { .. })
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

/// Keys accepted in the configuration file
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub producers: Option<usize>,
    pub persist_failure: Option<f64>,
    pub action_failure: Option<f64>,
    pub mode: Option<RunMode>,
    pub messages: Option<usize>,
    pub publish_delay_ms: Option<u64>,
    pub operation_delay_ms: Option<u64>,
    pub operation_timeout_ms: Option<u64>,
    pub action_retries: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_file: Option<PathBuf>,
    pub color: Option<bool>,
}

impl FileConfig {
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load an explicitly named file, or the default one if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Option<Self>, ConfigError> {
        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(None),
            },
        };

        log::debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&path, &contents).map(Some)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Logging options, resolved before the pipeline starts
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    /// `None` means decide from the terminal
    pub color: Option<bool>,
}

/// Fully resolved and validated configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub producers: usize,
    pub persist_failure: FailureProbability,
    pub action_failure: FailureProbability,
    pub mode: RunMode,
    pub messages: usize,
    pub publish_delay: Duration,
    pub operation_delay: Duration,
    pub operation_timeout: Option<Duration>,
    pub action_retries: usize,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Read the configuration file named by `args` (if any) and resolve
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = FileConfig::load(args.config_file.as_deref())?.unwrap_or_default();
        Self::resolve(args, file)
    }

    /// Merge command line over file values over defaults, then validate
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
        let mode = match args.mode.as_deref() {
            Some(name) => name
                .parse::<RunMode>()
                .map_err(|e| ConfigError::invalid("mode", e))?,
            None => file.mode.unwrap_or_default(),
        };

        let producers = args.producers.or(file.producers).unwrap_or(1);
        if producers == 0 {
            return Err(ConfigError::invalid("producers", "must be at least 1"));
        }

        let messages = args.messages.or(file.messages).unwrap_or(5);
        if mode == RunMode::Finite && messages == 0 {
            return Err(ConfigError::invalid(
                "messages",
                "must be at least 1 in finite mode",
            ));
        }

        let persist_failure = probability(
            "persist_failure",
            args.persist_failure.or(file.persist_failure),
        )?;
        let action_failure = probability(
            "action_failure",
            args.action_failure.or(file.action_failure),
        )?;

        let operation_timeout = args
            .operation_timeout_ms
            .or(file.operation_timeout_ms)
            .map(Duration::from_millis);
        if operation_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::invalid(
                "operation_timeout_ms",
                "must be greater than 0",
            ));
        }

        let action_retries = args.action_retries.or(file.action_retries).unwrap_or(0);
        if action_retries > MAX_ACTION_RETRIES {
            return Err(ConfigError::invalid(
                "action_retries",
                format!("must be at most {MAX_ACTION_RETRIES}"),
            ));
        }

        let format_name = args
            .log_format
            .clone()
            .or(file.log_format)
            .unwrap_or_else(|| "text".to_string());
        let format = LogFormat::parse(&format_name).ok_or_else(|| {
            ConfigError::invalid("log_format", format!("unknown format '{format_name}'"))
        })?;

        Ok(Self {
            producers,
            persist_failure,
            action_failure,
            mode,
            messages,
            publish_delay: Duration::from_millis(
                args.publish_delay_ms.or(file.publish_delay_ms).unwrap_or(1000),
            ),
            operation_delay: Duration::from_millis(
                args.operation_delay_ms
                    .or(file.operation_delay_ms)
                    .unwrap_or(1000),
            ),
            operation_timeout,
            action_retries,
            logging: LoggingConfig {
                level: args
                    .log_level
                    .clone()
                    .or(file.log_level)
                    .unwrap_or_else(|| "info".to_string()),
                format,
                file: args.log_file.clone().or(file.log_file),
                color: args.color_choice().or(file.color),
            },
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            producers: self.producers,
            mode: self.mode,
            messages_per_producer: self.messages,
            publish_delay: DelayRange::up_to(self.publish_delay),
        }
    }

    pub fn operation_delay(&self) -> DelayRange {
        DelayRange::up_to(self.operation_delay)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.action_retries, RetryPolicy::default().delay)
    }
}

fn probability(field: &str, value: Option<f64>) -> Result<FailureProbability, ConfigError> {
    match value {
        None => Ok(FailureProbability::default()),
        Some(p) => FailureProbability::new(p)
            .ok_or_else(|| ConfigError::invalid(field, format!("{p} is not within [0, 1]"))),
    }
}
