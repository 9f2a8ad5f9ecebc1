//! Field-data API client.
//!
//! Delta queries are paginated; upserts and deletes carry an
//! `Idempotency-Key` header so a replayed queue item is applied once.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

use fieldsync_core::errors::RemoteError;
use fieldsync_core::offline::Record;
use fieldsync_core::remote::{DataCategory, FetchScope, RemoteDataService};

use crate::error::{RemoteClientError, Result};
use crate::types::{ApiErrorResponse, ChangesResponse, HealthResponse};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_LOG_BODY_CHARS: usize = 512;
/// Upper bound on pages followed for one delta query.
const MAX_PAGES: u32 = 1_000;
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Clone)]
pub struct FieldDataClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout_ms: u64,
}

impl FieldDataClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[RemoteData] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[RemoteData] API response error ({}): {}", status, preview);
    }

    /// Create a client for `base_url` (e.g. "https://api.example.com").
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout_ms,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, idempotency_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteClientError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        if let Some(key) = idempotency_key {
            let key_value = HeaderValue::from_str(key)
                .map_err(|_| RemoteClientError::invalid_request("Invalid idempotency key"))?;
            headers.insert(IDEMPOTENCY_KEY_HEADER, key_value);
        }

        Ok(headers)
    }

    fn record_url(&self, store: &str, id: &str) -> Result<String> {
        if id.trim().is_empty() {
            return Err(RemoteClientError::invalid_request(format!(
                "{} record without id",
                store
            )));
        }
        Ok(format!(
            "{}/api/v1/data/{}/{}",
            self.base_url,
            urlencoding::encode(store),
            urlencoding::encode(id)
        ))
    }

    async fn check_status(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(RemoteClientError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(RemoteClientError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }
        Ok(body)
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let body = Self::check_status(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            log::error!("[RemoteData] Failed to deserialize response: {}", e);
            RemoteClientError::Json(e)
        })
    }

    /// One page of a category delta.
    ///
    /// GET /api/v1/data/{category}/changes?since=&userId=&date=&page=
    pub async fn get_changes_page(
        &self,
        category: DataCategory,
        scope: &FetchScope,
        since: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<ChangesResponse> {
        let url = format!(
            "{}/api/v1/data/{}/changes",
            self.base_url,
            category.as_str()
        );
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(value) = since {
            query.push(("since", value.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        if let Some(user_id) = &scope.user_id {
            query.push(("userId", user_id.clone()));
        }
        if let Some(date) = &scope.date {
            query.push(("date", date.clone()));
        }
        query.push(("page", page.to_string()));

        let response = self
            .client
            .get(&url)
            .headers(self.headers(None)?)
            .query(&query)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Every page of a category delta, as records.
    pub async fn get_changes(
        &self,
        category: DataCategory,
        scope: &FetchScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let body = self.get_changes_page(category, scope, since, page).await?;
            for value in body.records {
                let record = Record::from_value(value).map_err(|e| {
                    RemoteClientError::invalid_request(format!(
                        "{} delta carried a non-object record: {}",
                        category.as_str(),
                        e
                    ))
                })?;
                records.push(record);
            }
            match body.next_page {
                Some(next) if next > page && next <= MAX_PAGES => page = next,
                Some(next) => {
                    return Err(RemoteClientError::api(
                        200,
                        format!("{} delta returned invalid next page {}", category.as_str(), next),
                    ))
                }
                None => break,
            }
        }
        debug!(
            "[RemoteData] Fetched {} {} record(s) in {} page(s)",
            records.len(),
            category.as_str(),
            page
        );
        Ok(records)
    }

    /// PUT /api/v1/data/{store}/{id}
    pub async fn put_record(&self, store: &str, record: &Record, idempotency_key: &str) -> Result<()> {
        let id = record
            .id()
            .ok_or_else(|| RemoteClientError::invalid_request(format!("{} record without id", store)))?;
        let url = self.record_url(store, &id)?;
        let response = self
            .client
            .put(&url)
            .headers(self.headers(Some(idempotency_key))?)
            .json(record)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// DELETE /api/v1/data/{store}/{id}. A 404 means the record is already gone.
    pub async fn remove_record(&self, store: &str, id: &str, idempotency_key: &str) -> Result<()> {
        let url = self.record_url(store, id)?;
        let response = self
            .client
            .delete(&url)
            .headers(self.headers(Some(idempotency_key))?)
            .send()
            .await?;
        match Self::check_status(response).await {
            Err(RemoteClientError::Api { status: 404, .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    /// GET /api/v1/health
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/api/v1/health", self.base_url);
        let response = self.client.get(&url).headers(self.headers(None)?).send().await?;
        let health: HealthResponse = Self::parse_response(response).await?;
        Ok(health.is_ok())
    }
}

#[async_trait]
impl RemoteDataService for FieldDataClient {
    async fn fetch_changes(
        &self,
        category: DataCategory,
        scope: &FetchScope,
        since: Option<DateTime<Utc>>,
    ) -> std::result::Result<Vec<Record>, RemoteError> {
        self.get_changes(category, scope, since)
            .await
            .map_err(|e| e.into_remote_error(&format!("fetch {}", category.as_str()), self.timeout_ms))
    }

    async fn upsert_record(
        &self,
        store: &str,
        record: &Record,
        idempotency_key: &str,
    ) -> std::result::Result<(), RemoteError> {
        self.put_record(store, record, idempotency_key)
            .await
            .map_err(|e| e.into_remote_error(&format!("upsert {}", store), self.timeout_ms))
    }

    async fn delete_record(
        &self,
        store: &str,
        id: &str,
        idempotency_key: &str,
    ) -> std::result::Result<(), RemoteError> {
        self.remove_record(store, id, idempotency_key)
            .await
            .map_err(|e| e.into_remote_error(&format!("delete {}/{}", store, id), self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::errors::SyncRetryClass;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        target: String,
        headers: HashMap<String, String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
        delay_ms: u64,
    }

    fn respond(status: u16, body: serde_json::Value) -> MockResponse {
        MockResponse {
            status,
            body: body.to_string(),
            delay_ms: 0,
        }
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            method,
            target,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (String, Arc<TokioMutex<Vec<CapturedRequest>>>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);
                    let response = scripted_inner.lock().await.pop_front().unwrap_or(
                        respond(500, json!({ "code": "INTERNAL", "message": "unexpected request" })),
                    );
                    if response.delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(response.delay_ms)).await;
                    }
                    let _ = write_http_response(&mut stream, response.status, &response.body).await;
                });
            }
        });

        (format!("http://{}", addr), captured)
    }

    fn client(base_url: &str) -> FieldDataClient {
        FieldDataClient::new(base_url, 2_000)
            .expect("client")
            .with_token(Some("token-1".to_string()))
    }

    #[tokio::test]
    async fn fetch_changes_follows_pages_with_scope_query() {
        let (base_url, captured) = start_mock_server(vec![
            respond(200, json!({ "records": [{ "id": "v1" }, { "id": "v2" }], "nextPage": 2 })),
            respond(200, json!({ "records": [{ "id": 3 }] })),
        ])
        .await;
        let since = DateTime::parse_from_rfc3339("2026-10-16T08:00:00Z")
            .expect("since")
            .with_timezone(&Utc);

        let records = client(&base_url)
            .fetch_changes(
                DataCategory::Visits,
                &FetchScope::new(Some("u1".to_string()), Some("2026-10-16".to_string())),
                Some(since),
            )
            .await
            .expect("fetch");

        let ids: Vec<String> = records.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec!["v1", "v2", "3"]);

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "GET");
        assert!(requests[0].target.starts_with("/api/v1/data/visits/changes?"));
        assert!(requests[0].target.contains("since=2026-10-16T08%3A00%3A00.000Z"));
        assert!(requests[0].target.contains("userId=u1"));
        assert!(requests[0].target.contains("date=2026-10-16"));
        assert!(requests[1].target.ends_with("page=2"));
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer token-1")
        );
    }

    #[tokio::test]
    async fn upsert_sends_idempotency_key_and_record_body() {
        let (base_url, captured) = start_mock_server(vec![respond(200, json!({ "ok": true }))]).await;
        let record = Record::from_value(json!({ "id": "v 1", "retailerId": "r1" })).expect("record");

        client(&base_url)
            .upsert_record("visits", &record, "evt-123")
            .await
            .expect("upsert");

        let requests = captured.lock().await;
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].target, "/api/v1/data/visits/v%201");
        assert_eq!(
            requests[0].headers.get("idempotency-key").map(String::as_str),
            Some("evt-123")
        );
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).expect("json body");
        assert_eq!(body, json!({ "id": "v 1", "retailerId": "r1" }));
    }

    #[tokio::test]
    async fn delete_treats_missing_record_as_done() {
        let (base_url, captured) = start_mock_server(vec![respond(
            404,
            json!({ "code": "NOT_FOUND", "message": "no such order" }),
        )])
        .await;

        client(&base_url)
            .delete_record("orders", "o1", "evt-9")
            .await
            .expect("delete");
        assert_eq!(captured.lock().await[0].method, "DELETE");
    }

    #[tokio::test]
    async fn api_failures_keep_their_retry_class() {
        let (base_url, _captured) = start_mock_server(vec![
            respond(503, json!({ "code": "UNAVAILABLE", "message": "maintenance" })),
            respond(401, json!({ "code": "UNAUTHORIZED", "message": "expired token" })),
            respond(422, json!({ "code": "INVALID", "message": "retailerId required" })),
        ])
        .await;
        let c = client(&base_url);
        let record = Record::from_value(json!({ "id": "v1" })).expect("record");

        let unavailable = c.upsert_record("visits", &record, "e1").await.expect_err("503");
        assert_eq!(unavailable.retry_class(), SyncRetryClass::Retryable);
        assert_eq!(
            unavailable,
            RemoteError::api(503, "UNAVAILABLE: maintenance")
        );

        let unauthorized = c.upsert_record("visits", &record, "e2").await.expect_err("401");
        assert_eq!(unauthorized.retry_class(), SyncRetryClass::ReauthRequired);

        let invalid = c.upsert_record("visits", &record, "e3").await.expect_err("422");
        assert_eq!(invalid.retry_class(), SyncRetryClass::Permanent);
    }

    #[tokio::test]
    async fn malformed_delta_is_a_decode_error() {
        let (base_url, _captured) = start_mock_server(vec![MockResponse {
            status: 200,
            body: "{not json".to_string(),
            delay_ms: 0,
        }])
        .await;

        let err = client(&base_url)
            .fetch_changes(DataCategory::Products, &FetchScope::default(), None)
            .await
            .expect_err("decode");
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_response_maps_to_timeout() {
        let (base_url, _captured) = start_mock_server(vec![MockResponse {
            status: 200,
            body: json!({ "records": [] }).to_string(),
            delay_ms: 1_000,
        }])
        .await;
        let c = FieldDataClient::new(&base_url, 100).expect("client");

        let err = c
            .fetch_changes(DataCategory::Schemes, &FetchScope::default(), None)
            .await
            .expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(err.retry_class(), SyncRetryClass::Retryable);
    }

    #[tokio::test]
    async fn health_reports_service_status() {
        let (base_url, captured) = start_mock_server(vec![
            respond(200, json!({ "status": "ok" })),
            respond(200, json!({ "status": "degraded" })),
        ])
        .await;
        let c = client(&base_url);

        assert!(c.health().await.expect("health"));
        assert!(!c.health().await.expect("health"));
        assert_eq!(captured.lock().await[0].target, "/api/v1/health");
    }

    #[test]
    fn record_without_id_is_rejected_before_sending() {
        let c = FieldDataClient::new("http://localhost:1/", 1_000).expect("client");
        assert_eq!(c.base_url(), "http://localhost:1");
        assert!(matches!(
            c.record_url("visits", " "),
            Err(RemoteClientError::InvalidRequest(_))
        ));
    }
}
