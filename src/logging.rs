// ============================================================================
// File: packages/ramsync/src/logging.rs
// ----------------------------------------------------------------------------
// Logger installation for binaries embedding ramsync.
//
// The library itself only talks to the `log` facade; this module wires
// env_logger up with a text or JSON-lines format.
// ============================================================================

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use env_logger::{Builder, Env, Target};
use log::{LevelFilter, Record, debug};

use crate::error::StorageResult;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// `timestamp | LEVEL | target | message`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Default level; `RUST_LOG` overrides it
    pub level: LevelFilter,
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            format: LogFormat::Text,
            log_file: None,
        }
    }
}

impl LogSettings {
    /// Debug level when `verbose`, info otherwise
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.level = if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_log_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Install the global logger
///
/// Safe to call more than once; later calls leave the first logger in place.
///
/// # Returns
/// `Err` only when the log file cannot be opened
pub fn init_logging(settings: &LogSettings) -> StorageResult<()> {
    let env = Env::default().default_filter_or(settings.level.as_str());
    let mut builder = Builder::from_env(env);

    match settings.format {
        LogFormat::Text => builder.format(|buf, record| {
            writeln!(buf, "{}", render_text(record, &timestamp()))
        }),
        LogFormat::Json => builder.format(|buf, record| {
            writeln!(buf, "{}", render_json(record, &timestamp()))
        }),
    };

    if let Some(path) = &settings.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    if builder.try_init().is_err() {
        debug!("Logger already installed");
    }
    Ok(())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn render_text(record: &Record<'_>, timestamp: &str) -> String {
    format!(
        "{} | {:<5} | {} | {}",
        timestamp,
        record.level(),
        record.target(),
        record.args()
    )
}

fn render_json(record: &Record<'_>, timestamp: &str) -> String {
    serde_json::json!({
        "timestamp": timestamp,
        "level": record.level().as_str(),
        "logger": record.target(),
        "message": record.args().to_string(),
    })
    .to_string()
}
