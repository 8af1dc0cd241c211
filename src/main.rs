mod cli;
mod orchestrator;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;
use nightwatch::logging::{self, LogTarget};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.is_one_shot();

    if is_non_tui {
        logging::init(args.debug, LogTarget::Stderr)?;
    } else {
        let path = args.log_file.clone().unwrap_or_else(logging::default_log_file);
        logging::init(args.debug, LogTarget::File(&path))?;
    }

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting with error");
            Err(e)
        }
    }
}
