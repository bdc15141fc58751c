//! CSP Suggest service
//!
//! Collects CSP violation reports posted by browsers (the `report-uri` of a
//! report-only policy) and derives a policy that would have allowed them.

use clap::Parser;

pub mod error;
pub mod logging;
pub mod policy;
pub mod server;

pub use error::SuggestError;
pub use logging::{init_logging, LoggingConfig};
pub use policy::{suggest_policy, ContentSecurityPolicy, SourceMatch};
pub use server::{router, serve, start_service, AppState};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 18282)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit JSON formatted logs
    #[arg(long)]
    pub json_logs: bool,

    /// Also write logs to this file, rotated daily
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Args {
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            json_format: self.json_logs,
            log_file: self.log_file.clone(),
            ..LoggingConfig::default()
        }
        .with_level(&self.log_level)
    }
}

/// Run the service until it fails. Logging is set up by the caller.
pub async fn run_service(args: Args) -> Result<(), SuggestError> {
    tracing::info!("Starting CSP Suggest service...");
    tracing::info!("  Listen: {}:{}", args.host, args.port);

    start_service(&args.host, args.port, AppState::new()).await
}
