//! CSP Suggest Binary Entry Point

use clap::Parser;
use csp_suggest::{init_logging, run_service, Args};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let _log_guard = init_logging(&args.logging_config())?;

    tokio::select! {
        result = run_service(args) => {
            if let Err(e) = result {
                tracing::error!("CSP Suggest service failed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping CSP Suggest service...");
        }
    }

    Ok(())
}
