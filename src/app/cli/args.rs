//! Command-line arguments
//!
//! Every pipeline option is optional here so that values from the
//! configuration file only apply where the command line is silent.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mayhem")]
#[command(about = "Concurrent producer/consumer pipeline with graceful shutdown")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Number of concurrent producers
    #[arg(short = 'p', long = "producers", value_name = "COUNT")]
    pub producers: Option<usize>,

    /// Probability (0-1) that saving a message fails
    #[arg(long = "persist-failure", value_name = "PROBABILITY")]
    pub persist_failure: Option<f64>,

    /// Probability (0-1) that restarting a host fails
    #[arg(long = "action-failure", value_name = "PROBABILITY")]
    pub action_failure: Option<f64>,

    /// Stop after a fixed number of messages or run until signalled
    #[arg(short = 'm', long = "mode", value_name = "MODE", value_parser = ["finite", "endless"])]
    pub mode: Option<String>,

    /// Messages per producer in finite mode
    #[arg(short = 'n', long = "messages", value_name = "COUNT")]
    pub messages: Option<usize>,

    /// Upper bound of the random delay before each publish
    #[arg(long = "publish-delay-ms", value_name = "MILLIS")]
    pub publish_delay_ms: Option<u64>,

    /// Upper bound of the random delay inside each sub-operation
    #[arg(long = "operation-delay-ms", value_name = "MILLIS")]
    pub operation_delay_ms: Option<u64>,

    /// Abandon a sub-operation attempt after this long
    #[arg(long = "operation-timeout-ms", value_name = "MILLIS")]
    pub operation_timeout_ms: Option<u64>,

    /// Extra attempts for a failed host restart
    #[arg(long = "action-retries", value_name = "COUNT")]
    pub action_retries: Option<usize>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Force colored output
    #[arg(long = "color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color", conflicts_with = "color")]
    pub no_color: bool,
}

impl Args {
    /// Explicit color choice; `None` means decide from the terminal
    pub fn color_choice(&self) -> Option<bool> {
        match (self.color, self.no_color) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}
