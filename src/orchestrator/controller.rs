//! Session controller.
//!
//! Owns the HTTP client and the scan session, runs commands from presentation layers
//! and emits events back to them.

use super::post_process;
use anyhow::{Context, Result};
use nightwatch::api::{NightwatchClient, SingleShotScan};
use nightwatch::error::ClientError;
use nightwatch::model::{ClientConfig, Domain, HealthStatus, QueryResult, ScanCompletion, ScanHistoryEntry};
use nightwatch::scan::{ScanConnector, ScanSession, ScanUpdate};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Query { text: String, domain: Domain },
    StartScan(Domain),
    CloseScan,
    RefreshHealth,
    RefreshHistory,
    LoadScan(String),
    Quit,
}

/// Events the controller sends back to the UI.
#[derive(Debug)]
pub(crate) enum AppEvent {
    Health(Result<HealthStatus, ClientError>),
    Scan(ScanUpdate),
    QueryFinished {
        domain: Domain,
        result: Result<QueryResult, ClientError>,
    },
    History(Result<Vec<ScanHistoryEntry>, ClientError>),
    HistoryDetail {
        scan_id: String,
        result: Result<ScanCompletion, ClientError>,
    },
}

/// Streamed connector, or the single-shot endpoint when streaming is off.
pub(crate) fn scan_connector(client: &NightwatchClient, stream: bool) -> Arc<dyn ScanConnector> {
    if stream {
        Arc::new(client.clone())
    } else {
        Arc::new(SingleShotScan(client.clone()))
    }
}

/// Build the API client, failing before any presentation layer starts.
pub(crate) fn connect(cfg: &ClientConfig) -> Result<NightwatchClient> {
    NightwatchClient::new(cfg).context("configure API client")
}

fn spawn_health(client: &NightwatchClient, event_tx: &UnboundedSender<AppEvent>) {
    let client = client.clone();
    let tx = event_tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(AppEvent::Health(client.health().await));
    });
}

fn spawn_history(client: &NightwatchClient, event_tx: &UnboundedSender<AppEvent>) {
    let client = client.clone();
    let tx = event_tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(AppEvent::History(client.scan_history().await));
    });
}

/// Run commands until `Quit` (or the command channel closes).
///
/// Queries run as their own tasks, so a query and a scan can be in flight together.
pub(crate) async fn run_controller(
    client: NightwatchClient,
    cfg: &ClientConfig,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (scan_tx, mut scan_rx) = mpsc::unbounded_channel::<ScanUpdate>();
    let mut session = ScanSession::new(scan_connector(&client, cfg.stream), scan_tx)
        .with_timeout(cfg.scan_timeout);

    spawn_health(&client, &event_tx);
    spawn_history(&client, &event_tx);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Query { text, domain }) => {
                        let client = client.clone();
                        let tx = event_tx.clone();
                        tokio::spawn(async move {
                            let result = client.query(&text, domain).await;
                            let _ = tx.send(AppEvent::QueryFinished { domain, result });
                        });
                    }
                    Some(UiCommand::StartScan(domain)) => {
                        session.start(domain).await;
                    }
                    Some(UiCommand::CloseScan) => {
                        if !session.close().await {
                            tracing::debug!("close requested with no open scan");
                        }
                    }
                    Some(UiCommand::RefreshHealth) => spawn_health(&client, &event_tx),
                    Some(UiCommand::RefreshHistory) => spawn_history(&client, &event_tx),
                    Some(UiCommand::LoadScan(scan_id)) => {
                        let client = client.clone();
                        let tx = event_tx.clone();
                        tokio::spawn(async move {
                            let result = client.scan_detail(&scan_id).await;
                            let _ = tx.send(AppEvent::HistoryDetail { scan_id, result });
                        });
                    }
                    Some(UiCommand::Quit) | None => {
                        session.close().await;
                        break;
                    }
                }
            }
            Some(update) = scan_rx.recv() => {
                let refresh = post_process::wants_history_refresh(&update);
                let _ = event_tx.send(AppEvent::Scan(update));
                if refresh {
                    spawn_history(&client, &event_tx);
                }
            }
        }
    }

    tracing::info!("controller stopped");
    Ok(())
}
