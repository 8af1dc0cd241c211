//! Application-level orchestration utilities.
//!
//! This module owns the backend session lifecycle (queries, scan start/close, history)
//! and post-result processing such as exports. UI/CLI layers call into this module to
//! keep responsibilities separated.

mod controller;
mod post_process;

#[cfg(feature = "tui")]
pub(crate) use controller::{run_controller, AppEvent, UiCommand};
pub(crate) use controller::{connect, scan_connector};
pub(crate) use post_process::export_rows_to;
#[cfg(feature = "tui")]
pub(crate) use post_process::{export_rows, ExportReport};
