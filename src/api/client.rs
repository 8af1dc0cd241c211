use crate::api::sse::{self, SseFrame};
use crate::error::ClientError;
use crate::model::{ClientConfig, Domain, HealthStatus, QueryResult, ScanCompletion, ScanHistoryEntry};
use crate::query::QueryRpc;
use crate::scan::{FrameStream, ScanConnector};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HEALTH_PATH: &str = "/health";
const QUERY_PATH: &str = "/api/v1/query";
const SCAN_PATH: &str = "/api/v1/sentinel/scan";
const SCAN_STREAM_PATH: &str = "/api/v1/sentinel/scan/stream";
const HISTORY_PATH: &str = "/api/v1/sentinel/history";

/// `{ success, data?, error? }` wrapper used by every JSON endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<Option<T>, ClientError> {
        if self.success {
            return Ok(self.data);
        }
        let (code, message) = match self.error {
            Some(e) => (e.code, e.message),
            None => (String::new(), String::new()),
        };
        Err(ClientError::Api {
            code: if code.is_empty() { "UNKNOWN".into() } else { code },
            message: if message.is_empty() {
                "request failed".into()
            } else {
                message
            },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct HealthData {
    #[serde(default)]
    env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: QueryResult,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryData {
    #[serde(default)]
    history: Vec<ScanHistoryEntry>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    domain: Domain,
}

/// HTTP client for the analytics backend.
#[derive(Debug, Clone)]
pub struct NightwatchClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl NightwatchClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = cfg.base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: cfg.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: cfg.base_url.clone(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        // No overall timeout on the client: the scan stream is long-lived. Request/response
        // calls set their own per-request timeout.
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            request_timeout: cfg.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Url::parse(&format!("{}{}", self.base_url, path)).map_err(|e| ClientError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })
    }

    fn domain_endpoint(&self, path: &str, domain: Domain) -> Result<Url, ClientError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().append_pair("domain", domain.as_str());
        Ok(url)
    }

    async fn decode_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<ApiEnvelope<T>, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                endpoint: resp.url().path().to_string(),
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_data<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, ClientError> {
        tracing::debug!(url = %url, "GET");
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::decode_envelope::<T>(resp).await?.into_data()
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let url = self.endpoint(HEALTH_PATH)?;
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let envelope = Self::decode_envelope::<HealthData>(resp).await?;
        Ok(HealthStatus {
            online: envelope.success,
            env: envelope.data.and_then(|d| d.env),
        })
    }

    pub async fn query(&self, text: &str, domain: Domain) -> Result<QueryResult, ClientError> {
        let url = self.endpoint(QUERY_PATH)?;
        tracing::debug!(url = %url, %domain, "POST query");
        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(&QueryRequest {
                query: text,
                domain,
            })
            .send()
            .await?;
        let data = Self::decode_envelope::<QueryData>(resp).await?.into_data()?;
        Ok(data.unwrap_or_default().result)
    }

    /// Non-streaming scan; blocks until the backend has finished.
    pub async fn scan_once(&self, domain: Domain) -> Result<ScanCompletion, ClientError> {
        let url = self.domain_endpoint(SCAN_PATH, domain)?;
        // A full scan can outlast the request timeout, so none is applied here.
        tracing::debug!(url = %url, "GET single-shot scan");
        let resp = self.http.get(url).send().await?;
        let data = Self::decode_envelope::<ScanCompletion>(resp)
            .await?
            .into_data()?;
        Ok(data.unwrap_or_default())
    }

    pub async fn scan_history(&self) -> Result<Vec<ScanHistoryEntry>, ClientError> {
        let url = self.endpoint(HISTORY_PATH)?;
        let data = self.get_data::<HistoryData>(url).await?;
        Ok(data.unwrap_or_default().history)
    }

    pub async fn scan_detail(&self, scan_id: &str) -> Result<ScanCompletion, ClientError> {
        let mut url = self.endpoint(HISTORY_PATH)?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "base URL cannot carry a path".into(),
            })?
            .push(scan_id);
        let data = self.get_data::<ScanCompletion>(url).await?;
        Ok(data.unwrap_or_default())
    }

    /// Open the scan event stream. Fails on a non-success handshake.
    pub async fn open_scan_stream(&self, domain: Domain) -> Result<FrameStream, ClientError> {
        let url = self.domain_endpoint(SCAN_STREAM_PATH, domain)?;
        tracing::debug!(url = %url, "opening scan stream");
        let resp = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                endpoint: resp.url().path().to_string(),
            });
        }
        Ok(sse::frames(Box::pin(resp.bytes_stream())).boxed())
    }
}

impl QueryRpc for NightwatchClient {
    fn query<'a>(
        &'a self,
        text: &'a str,
        domain: Domain,
    ) -> BoxFuture<'a, Result<QueryResult, ClientError>> {
        NightwatchClient::query(self, text, domain).boxed()
    }
}

impl ScanConnector for NightwatchClient {
    fn connect(&self, domain: Domain) -> BoxFuture<'static, Result<FrameStream, ClientError>> {
        let client = self.clone();
        async move { client.open_scan_stream(domain).await }.boxed()
    }
}

/// Adapts the single-shot scan endpoint to the streaming session: the response becomes
/// one synthesized `complete` frame.
#[derive(Debug, Clone)]
pub struct SingleShotScan(pub NightwatchClient);

impl ScanConnector for SingleShotScan {
    fn connect(&self, domain: Domain) -> BoxFuture<'static, Result<FrameStream, ClientError>> {
        let client = self.0.clone();
        async move {
            let completion = client.scan_once(domain).await?;
            let frame = SseFrame::new("complete", serde_json::to_string(&completion)?);
            let stream: FrameStream = futures::stream::iter([Ok(frame)]).boxed();
            Ok::<_, ClientError>(stream)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(base: &str) -> ClientConfig {
        ClientConfig {
            base_url: base.into(),
            domain: Domain::General,
            request_timeout: Duration::from_secs(5),
            scan_timeout: None,
            stream: true,
            user_agent: "nightwatch-test".into(),
        }
    }

    #[test]
    fn trailing_slash_is_normalised() {
        let c = NightwatchClient::new(&cfg("http://localhost:8000/")).unwrap();
        assert_eq!(c.base_url(), "http://localhost:8000");
        assert_eq!(
            c.endpoint(HEALTH_PATH).unwrap().as_str(),
            "http://localhost:8000/health"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let c = NightwatchClient::new(&cfg("https://example.test/nightwatch")).unwrap();
        let url = c.domain_endpoint(SCAN_STREAM_PATH, Domain::Risk).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/nightwatch/api/v1/sentinel/scan/stream?domain=risk"
        );
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            NightwatchClient::new(&cfg("ftp://example.test")),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            NightwatchClient::new(&cfg("not a url")),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn envelope_failure_maps_to_api_error() {
        let env: ApiEnvelope<QueryData> = serde_json::from_str(
            r#"{"success": false, "error": {"code": "INVALID_SQL", "message": "no such table"}}"#,
        )
        .unwrap();
        match env.into_data() {
            Err(ClientError::Api { code, message }) => {
                assert_eq!(code, "INVALID_SQL");
                assert_eq!(message, "no such table");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn envelope_failure_without_body_gets_placeholder() {
        let env: ApiEnvelope<QueryData> = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(matches!(
            env.into_data(),
            Err(ClientError::Api { ref code, .. }) if code == "UNKNOWN"
        ));
    }

    #[test]
    fn successful_envelope_without_data_is_empty() {
        let env: ApiEnvelope<QueryData> = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(env.into_data().unwrap().is_none());
    }
}
