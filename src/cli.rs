use crate::orchestrator;
use anyhow::{Context, Result};
use clap::Parser;
use nightwatch::api::NightwatchClient;
use nightwatch::model::{ClientConfig, Domain, Record};
use nightwatch::query::{run_query, QueryOutcome};
use nightwatch::scan::{ScanSession, ScanUpdate, ScanUpdateKind};
use nightwatch::state::ViewState;
use nightwatch::text_summary;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "nightwatch",
    version,
    about = "Nightwatch Analytics client: natural-language queries and Sentinel scans, with optional TUI"
)]
pub struct Cli {
    /// Base URL of the Nightwatch API
    #[arg(long, env = "NIGHTWATCH_API_BASE", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Analytical domain (general, security, compliance, risk, operations)
    #[arg(long, default_value = "general")]
    pub domain: Domain,

    /// Ask one question, print the answer and exit (no TUI)
    #[arg(long, value_name = "TEXT", conflicts_with_all = ["scan", "health", "history"])]
    pub query: Option<String>,

    /// Run one Sentinel scan, print progress and the result, then exit (no TUI)
    #[arg(long, conflicts_with_all = ["health", "history"])]
    pub scan: bool,

    /// Check API health and exit
    #[arg(long, conflicts_with = "history")]
    pub health: bool,

    /// List past scans and exit
    #[arg(long)]
    pub history: bool,

    /// Print JSON instead of text in the one-shot modes
    #[arg(long)]
    pub json: bool,

    /// Use the single-shot scan endpoint instead of the event stream
    #[arg(long)]
    pub no_stream: bool,

    /// Timeout for request/response calls
    #[arg(long, default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// Deadline for a whole scan session
    #[arg(long)]
    pub scan_timeout: Option<humantime::Duration>,

    /// Export query rows or scan findings as CSV after a one-shot run
    #[arg(long, value_name = "PATH")]
    pub export_csv: Option<std::path::PathBuf>,

    /// Directory for exports made from the TUI (default: download directory)
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<std::path::PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long)]
    pub debug: bool,

    /// Log file used while the TUI is running
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<std::path::PathBuf>,
}

impl Cli {
    /// True when a one-shot mode was requested and the TUI will not start.
    pub fn is_one_shot(&self) -> bool {
        self.query.is_some() || self.scan || self.health || self.history || !cfg!(feature = "tui")
    }
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: args.base_url.clone(),
        domain: args.domain,
        request_timeout: Duration::from(args.request_timeout),
        scan_timeout: args.scan_timeout.map(Duration::from),
        stream: !args.no_stream,
        user_agent: format!("nightwatch-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if let Some(text) = args.query.clone() {
        return run_query_once(&args, &text).await;
    }
    if args.scan {
        return run_scan_once(&args).await;
    }
    if args.health {
        return run_health(&args).await;
    }
    if args.history {
        return run_history(&args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Without the TUI the default mode is a health check.
        run_health(&args).await
    }
}

fn client(args: &Cli) -> Result<NightwatchClient> {
    orchestrator::connect(&build_config(args))
}

async fn run_query_once(args: &Cli, text: &str) -> Result<()> {
    let client = client(args)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let mut state = ViewState::new(args.domain);

    let outcome = run_query(&client, &mut state, text, args.domain).await;
    let res = match outcome {
        QueryOutcome::Skipped => {
            let _ = out_tx.send(OutputLine::Stderr("Nothing to ask: query text is empty".into()));
            Ok(())
        }
        QueryOutcome::Failed(e) => Err(anyhow::Error::new(e).context("query failed")),
        QueryOutcome::Answered { .. } | QueryOutcome::Clarification => {
            let rows: &[Record] = state
                .last_query
                .as_ref()
                .map(|r| r.rows.as_slice())
                .unwrap_or_default();
            handle_exports(args, rows, &out_tx)?;

            if args.json {
                let out = serde_json::to_string_pretty(&state.last_query)?;
                let _ = out_tx.send(OutputLine::Stdout(out));
            } else if let (Some(reply), Some(result)) =
                (state.messages().last(), state.last_query.as_ref())
            {
                let summary = text_summary::build_query_summary(reply, result, state.render.as_ref());
                for line in summary.lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            }
            Ok(())
        }
    };

    drop(out_tx);
    let _ = out_handle.await;
    res
}

async fn run_scan_once(args: &Cli) -> Result<()> {
    let cfg = build_config(args);
    let client = orchestrator::connect(&cfg)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let (scan_tx, mut scan_rx) = mpsc::unbounded_channel::<ScanUpdate>();
    let mut session = ScanSession::new(orchestrator::scan_connector(&client, cfg.stream), scan_tx)
        .with_timeout(cfg.scan_timeout);

    let mut state = ViewState::new(args.domain);
    session.start(args.domain).await;

    let res = loop {
        tokio::select! {
            update = scan_rx.recv() => {
                let Some(update) = update else {
                    break Err(anyhow::anyhow!("scan session ended unexpectedly"));
                };
                if !args.json {
                    if let ScanUpdateKind::Event(ev) = &update.kind {
                        let _ = out_tx.send(OutputLine::Stderr(text_summary::scan_event_line(ev)));
                    }
                }
                state.apply_scan_update(update);
                if !state.scan_running() {
                    break Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.close().await;
                // The Failed("scan closed") update is queued; let the loop apply it.
            }
        }
    };
    drop(session);

    let res = res.and_then(|()| {
        let scan = state
            .scan
            .as_ref()
            .context("scan produced no session state")?;
        if let Some(reason) = scan.failure.as_deref() {
            return Err(anyhow::anyhow!("scan failed: {reason}"));
        }
        let completion = scan.result.as_ref().context("scan produced no result")?;
        handle_exports(args, &completion.findings, &out_tx)?;
        if args.json {
            let out = serde_json::to_string_pretty(completion)?;
            let _ = out_tx.send(OutputLine::Stdout(out));
        } else {
            for line in text_summary::build_scan_summary(completion).lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
        Ok(())
    });

    drop(out_tx);
    let _ = out_handle.await;
    res
}

async fn run_health(args: &Cli) -> Result<()> {
    let client = client(args)?;
    let health = client.health().await.context("health check failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!("{}", text_summary::health_line(&health));
    }
    Ok(())
}

async fn run_history(args: &Cli) -> Result<()> {
    let client = client(args)?;
    let history = client.scan_history().await.context("load scan history")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        for line in text_summary::history_lines(&history) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Handle `--export-csv` for both text and JSON modes.
fn handle_exports(args: &Cli, rows: &[Record], out_tx: &mpsc::UnboundedSender<OutputLine>) -> Result<()> {
    if let Some(p) = args.export_csv.as_deref() {
        match orchestrator::export_rows_to(rows, p)? {
            Some(path) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Exported CSV: {}", path.display())));
            }
            None => {
                let _ = out_tx.send(OutputLine::Stderr("No rows to export".into()));
            }
        }
    }
    Ok(())
}
