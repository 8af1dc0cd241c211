//! Structured logging setup.
//!
//! Filter priority: `RUST_LOG` > `--debug` > the mode's default level.
//! The terminal UI owns the screen, so in that mode logs go to a file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Default level for one-shot text modes.
pub const DEFAULT_TEXT_LEVEL: &str = "warn";
/// Default level when logging to a file under the TUI.
pub const DEFAULT_TUI_LEVEL: &str = "info";

pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

/// `<cache dir>/nightwatch/nightwatch.log`, or the current directory when there is
/// no cache dir.
pub fn default_log_file() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("nightwatch"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nightwatch.log")
}

fn filter(debug_flag: bool, default_level: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug_flag {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(default_level)
    }
}

pub fn init(debug_flag: bool, target: LogTarget<'_>) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_target(true).compact();

    match target {
        LogTarget::Stderr => builder
            .with_env_filter(filter(debug_flag, DEFAULT_TEXT_LEVEL))
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?,
        LogTarget::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder
                .with_env_filter(filter(debug_flag, DEFAULT_TUI_LEVEL))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?
        }
    }

    tracing::debug!(
        app = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "logging initialised"
    );
    Ok(())
}
