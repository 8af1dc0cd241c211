// End-to-end tests for the HTTP client against an in-process backend.
//
// A minimal HTTP/1.1 server on a loopback socket answers with canned JSON
// envelopes and server-sent event bodies (deliberately split across writes),
// so these tests exercise the real reqwest client and the SSE decoder.

use nightwatch::api::{NightwatchClient, SingleShotScan};
use nightwatch::error::ClientError;
use nightwatch::model::{ClientConfig, Domain, ScanEventKind, SessionStatus};
use nightwatch::query::{run_query, QueryOutcome};
use nightwatch::scan::{ScanSession, ScanUpdate};
use nightwatch::state::ViewState;
use nightwatch::viz::RenderSpec;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};

// =============================================================================
// Test server
// =============================================================================

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    body: String,
}

struct Reply {
    status: u16,
    content_type: &'static str,
    /// Written one after another with a short pause, to split the body across reads.
    chunks: Vec<String>,
}

impl Reply {
    fn json(v: Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            chunks: vec![v.to_string()],
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![json!({ "detail": "nope" }).to_string()],
        }
    }

    fn sse(chunks: &[&str]) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

type Handler = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

struct TestServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(handler: impl Fn(&Recorded) -> Reply + Send + Sync + 'static) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler: Handler = Arc::new(handler);

    let recorded = requests.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = handler.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let _ = handle(socket, handler, recorded).await;
            });
        }
    });

    TestServer {
        base: format!("http://{addr}"),
        requests,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn handle(
    mut socket: TcpStream,
    handler: Handler,
    recorded: Arc<Mutex<Vec<Recorded>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (head_end + content_length).min(buf.len());
    let req = Recorded {
        method,
        target,
        body: String::from_utf8_lossy(&buf[head_end..body_end]).to_string(),
    };
    recorded.lock().unwrap().push(req.clone());

    let reply = handler(&req);
    if reply.content_type == "text/event-stream" {
        let head = format!(
            "HTTP/1.1 {} OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
            reply.status
        );
        socket.write_all(head.as_bytes()).await?;
        socket.flush().await?;
        for c in &reply.chunks {
            tokio::time::sleep(Duration::from_millis(5)).await;
            socket.write_all(c.as_bytes()).await?;
            socket.flush().await?;
        }
    } else {
        let body: String = reply.chunks.concat();
        let head = format!(
            "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            reply.status,
            reply.content_type,
            body.len()
        );
        socket.write_all(head.as_bytes()).await?;
        socket.write_all(body.as_bytes()).await?;
    }
    socket.shutdown().await
}

fn client(base: &str) -> NightwatchClient {
    NightwatchClient::new(&ClientConfig {
        base_url: base.to_string(),
        domain: Domain::General,
        request_timeout: Duration::from_secs(5),
        scan_timeout: None,
        stream: true,
        user_agent: "nightwatch-tests".into(),
    })
    .unwrap()
}

async fn drain_to_terminal(rx: &mut UnboundedReceiver<ScanUpdate>, state: &mut ViewState) {
    loop {
        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("scan update in time")
            .expect("update channel open");
        let terminal = update.kind.is_terminal();
        state.apply_scan_update(update);
        if terminal {
            return;
        }
    }
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn e2e_health_reports_environment() {
    let server = serve(|_| Reply::json(json!({ "success": true, "data": { "env": "dev" } }))).await;
    let health = client(&server.base).health().await.unwrap();
    assert!(health.online);
    assert_eq!(health.env.as_deref(), Some("dev"));
    assert_eq!(server.requests()[0].target, "/health");
}

#[tokio::test]
async fn e2e_health_error_status_reads_offline() {
    let server = serve(|_| Reply::status(500)).await;
    let mut state = ViewState::default();
    let res = client(&server.base).health().await;
    assert!(matches!(res, Err(ClientError::Status { status: 500, .. })));
    state.apply_health(res);
    assert_eq!(state.health_label(), "API Offline");
}

#[tokio::test]
async fn e2e_base_url_path_prefix_is_kept() {
    let server = serve(|_| Reply::json(json!({ "success": true, "data": {} }))).await;
    client(&format!("{}/nightwatch/", server.base))
        .health()
        .await
        .unwrap();
    assert_eq!(server.requests()[0].target, "/nightwatch/health");
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn e2e_query_round_trip_updates_state() {
    let server = serve(|req| {
        assert_eq!(req.method, "POST");
        Reply::json(json!({
            "success": true,
            "data": { "result": {
                "sql": "SELECT COUNT(*) AS count FROM users",
                "rows": [{ "count": 1250 }],
                "insights": ["Most users signed up this year"],
                "visualization": { "type": "metric", "value": "Total users" },
                "clarification_needed": false,
                "clarification_questions": []
            }}
        }))
    })
    .await;
    let client = client(&server.base);
    let mut state = ViewState::new(Domain::Risk);

    let outcome = run_query(&client, &mut state, "  how many users?  ", Domain::Risk).await;
    assert!(matches!(outcome, QueryOutcome::Answered { rows: 1 }));

    let req = &server.requests()[0];
    assert_eq!(req.target, "/api/v1/query");
    let body: Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body, json!({ "query": "how many users?", "domain": "risk" }));

    let reply = state.messages().last().unwrap();
    assert_eq!(reply.text, "Here is what I found in risk.");
    assert_eq!(reply.sql(), Some("SELECT COUNT(*) AS count FROM users"));
    assert_eq!(
        state.render,
        Some(RenderSpec::Metric {
            label: "Total users".into(),
            value: "1250".into()
        })
    );
}

#[tokio::test]
async fn e2e_query_clarification_from_backend() {
    let server = serve(|_| {
        Reply::json(json!({
            "success": true,
            "data": { "result": {
                "sql": null,
                "rows": [],
                "clarification_needed": true,
                "clarification_questions": ["Which time range?", "Which region?"]
            }}
        }))
    })
    .await;
    let mut state = ViewState::default();
    let outcome = run_query(&client(&server.base), &mut state, "show sales", Domain::General).await;

    assert!(matches!(outcome, QueryOutcome::Clarification));
    let reply = state.messages().last().unwrap();
    assert_eq!(reply.text, "I need more info: Which time range? Which region?");
    assert_eq!(reply.sql(), None);
    assert!(state.render.is_none());
}

#[tokio::test]
async fn e2e_query_api_failure_adds_no_reply() {
    let server = serve(|_| {
        Reply::json(json!({
            "success": false,
            "error": { "code": "QUERY_FAILED", "message": "could not plan query" }
        }))
    })
    .await;
    let mut state = ViewState::default();
    let before = state.messages().len();
    let outcome = run_query(&client(&server.base), &mut state, "nonsense", Domain::General).await;

    match outcome {
        QueryOutcome::Failed(ClientError::Api { code, message }) => {
            assert_eq!(code, "QUERY_FAILED");
            assert_eq!(message, "could not plan query");
        }
        other => panic!("expected API failure, got {other:?}"),
    }
    assert_eq!(state.messages().len(), before + 1);
    assert!(!state.query_busy);
}

#[tokio::test]
async fn e2e_unreachable_backend_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let mut state = ViewState::default();
    let outcome = run_query(&client(&format!("http://{addr}")), &mut state, "q", Domain::General).await;
    assert!(matches!(outcome, QueryOutcome::Failed(ClientError::Transport(_))));
}

// =============================================================================
// Scans
// =============================================================================

#[tokio::test]
async fn e2e_streamed_scan_survives_split_frames() {
    let server = serve(|_| {
        Reply::sse(&[
            ": connected\r\n\r\nevent: status\r\ndata: {\"status\":\"sta",
            "rted\"}\r",
            "\n\r\nevent: mission\ndata: {\"mission_id\":\"failed_logins\",",
            "\ndata: \"status\":\"completed\"}\n\nevent: heartbeat\ndata: {}\n\n",
            "event: complete\ndata: {\"scan_id\":\"s-9\",\"risk_score\":64,\"narrative\":\"Elevated.\",\"findings\":[{\"mission_id\":\"failed_logins\",\"count\":3}]}\n\n",
        ])
    })
    .await;
    let client = client(&server.base);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ScanSession::new(Arc::new(client), tx);
    let mut state = ViewState::default();

    session.start(Domain::Security).await;
    drain_to_terminal(&mut rx, &mut state).await;

    assert_eq!(
        server.requests()[0].target,
        "/api/v1/sentinel/scan/stream?domain=security"
    );
    let scan = state.scan.as_ref().unwrap();
    assert_eq!(scan.status, SessionStatus::Completed);
    let kinds: Vec<_> = scan.events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [ScanEventKind::Status, ScanEventKind::Mission]);
    assert_eq!(scan.events[1].payload["status"], "completed");
    let result = scan.result.as_ref().unwrap();
    assert_eq!(result.risk_score, 64.0);
    assert_eq!(result.findings.len(), 1);
}

#[tokio::test]
async fn e2e_stream_closed_early_fails() {
    let server = serve(|_| Reply::sse(&["event: status\ndata: {}\n\n", "event: mission\ndata: {\"half\""])).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ScanSession::new(Arc::new(client(&server.base)), tx);
    let mut state = ViewState::default();

    session.start(Domain::General).await;
    drain_to_terminal(&mut rx, &mut state).await;

    let scan = state.scan.as_ref().unwrap();
    assert_eq!(scan.status, SessionStatus::Failed);
    assert_eq!(scan.events.len(), 1);
    assert_eq!(
        scan.failure.as_deref(),
        Some(ClientError::StreamEnded.to_string().as_str())
    );
}

#[tokio::test]
async fn e2e_refused_handshake_fails() {
    let server = serve(|_| Reply::status(503)).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ScanSession::new(Arc::new(client(&server.base)), tx);
    let mut state = ViewState::default();

    session.start(Domain::General).await;
    drain_to_terminal(&mut rx, &mut state).await;

    let scan = state.scan.as_ref().unwrap();
    assert_eq!(scan.status, SessionStatus::Failed);
    assert!(scan.failure.as_deref().unwrap().contains("503"));
    assert!(scan.events.is_empty());
}

#[tokio::test]
async fn e2e_single_shot_scan_completes() {
    let server = serve(|_| {
        Reply::json(json!({
            "success": true,
            "data": { "scan_id": "s-2", "domain": "general", "risk_score": 8, "narrative": "Quiet.", "findings": [] }
        }))
    })
    .await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ScanSession::new(Arc::new(SingleShotScan(client(&server.base))), tx);
    let mut state = ViewState::default();

    session.start(Domain::General).await;
    drain_to_terminal(&mut rx, &mut state).await;

    assert_eq!(server.requests()[0].target, "/api/v1/sentinel/scan?domain=general");
    let scan = state.scan.as_ref().unwrap();
    assert_eq!(scan.status, SessionStatus::Completed);
    assert!(scan.events.is_empty());
    assert_eq!(scan.result.as_ref().unwrap().narrative, "Quiet.");
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn e2e_history_list_and_detail() {
    let server = serve(|req| match req.target.as_str() {
        "/api/v1/sentinel/history" => Reply::json(json!({
            "success": true,
            "data": { "history": [
                { "scan_id": "a1", "domain": "security", "status": "completed", "risk_score": 42, "created_at": "2025-01-02T03:04:05" },
                { "scan_id": "b2", "domain": "general", "status": "completed", "risk_score": 3.5, "created_at": "2025-01-01T00:00:00" }
            ]}
        })),
        "/api/v1/sentinel/history/a1" => Reply::json(json!({
            "success": true,
            "data": { "scan_id": "a1", "risk_score": 42, "narrative": "Spike.", "findings": [{ "mission_id": "m" }] }
        })),
        _ => Reply::json(json!({
            "success": false,
            "error": { "code": "NOT_FOUND", "message": "Scan not found" }
        })),
    })
    .await;
    let client = client(&server.base);
    let mut state = ViewState::default();

    state.apply_history(client.scan_history().await);
    assert_eq!(state.history.len(), 2);
    assert_eq!(state.history[1].risk_score, 3.5);

    let id = state.selected_history().unwrap().scan_id.clone();
    let detail = client.scan_detail(&id).await;
    state.apply_history_detail(id, detail);
    let (loaded, completion) = state.history_detail.as_ref().unwrap();
    assert_eq!(loaded, "a1");
    assert_eq!(completion.findings.len(), 1);

    match client.scan_detail("missing").await {
        Err(ClientError::Api { code, .. }) => assert_eq!(code, "NOT_FOUND"),
        other => panic!("expected NOT_FOUND, got {other:?}"),
    }
}
