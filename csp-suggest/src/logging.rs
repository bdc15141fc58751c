use crate::SuggestError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration for the suggest service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    pub json_format: bool,

    /// Whether to include file and line number information
    pub include_file_info: bool,

    /// Colored output, ignored for JSON and file output
    pub enable_colors: bool,

    /// Log file path; rotated daily. Logs go to stdout as well.
    pub log_file: Option<String>,

    /// Module-specific log levels
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();
        module_levels.insert("csp_suggest".to_string(), "info".to_string());
        module_levels.insert("tower_http".to_string(), "info".to_string());
        module_levels.insert("hyper".to_string(), "warn".to_string());
        module_levels.insert("tokio".to_string(), "warn".to_string());

        Self {
            level: "info".to_string(),
            json_format: false,
            include_file_info: false,
            enable_colors: true,
            log_file: None,
            module_levels,
        }
    }
}

impl LoggingConfig {
    /// Level from the command line overrides the defaults for this crate too
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self.module_levels
            .insert("csp_suggest".to_string(), level.to_string());
        self
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, SuggestError> {
    if !levels::is_valid_level(&config.level) {
        return Err(SuggestError::Logging(format!("Invalid log level: {}", config.level)));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| SuggestError::Logging(format!("Invalid log directive: {}", e)))?,
        );
    }
    Ok(filter)
}

/// Initialize logging based on the provided configuration.
///
/// The returned guard flushes the file writer; keep it alive for the life
/// of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, SuggestError> {
    let filter = build_filter(config)?;

    let stdout_layer = if config.json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .with_ansi(config.enable_colors)
            .boxed()
    };

    let (file_layer, guard) = match &config.log_file {
        Some(log_file) => {
            let (writer, guard) = tracing_appender::non_blocking(create_file_appender(log_file)?);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            let layer = if config.json_format {
                layer.json().boxed()
            } else {
                layer.boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    match result {
        Ok(_) => tracing::info!("Logging initialized with level: {}", config.level),
        Err(_) => tracing::debug!("Logging already initialized, skipping"),
    }

    Ok(guard)
}

fn create_file_appender(log_file: &str) -> Result<RollingFileAppender, SuggestError> {
    let log_path = Path::new(log_file);
    let directory = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let filename = log_path
        .file_name()
        .ok_or_else(|| SuggestError::Logging("Invalid log file name".to_string()))?
        .to_string_lossy();

    std::fs::create_dir_all(directory)
        .map_err(|e| SuggestError::Logging(format!("Failed to create log directory: {}", e)))?;

    Ok(RollingFileAppender::new(Rotation::DAILY, directory, &*filename))
}

pub mod levels {
    pub fn is_valid_level(level: &str) -> bool {
        matches!(
            level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        )
    }
}
