//! HTTP transport for the remote import API.
//!
//! The actual HTTP client is abstracted via a trait so tests can script
//! responses. [`ReqwestClient`] is the production implementation: it is
//! built once from [`SyncSettings`] and never reconfigured afterwards.

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use chansync_protocol::{encode_batch, ImportRecord, ImportStatus};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use std::collections::VecDeque;
use tracing::debug;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a 200 response with a JSON body.
    pub fn ok_json(body: &str) -> Self {
        Self {
            status: 200,
            body: body.as_bytes().to_vec(),
        }
    }

    /// Creates an empty response with the given status.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// `Err` means the request never produced a response (connection refused,
/// timeout, TLS failure). Non-success statuses come back as `Ok`.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body.
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Sends a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;
}

/// Blocking `reqwest` client carrying the API key and JSON accept header.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds the client from settings.
    pub fn from_settings(settings: &SyncSettings) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let api_key = HeaderValue::from_str(&settings.api_key)
            .map_err(|e| SyncError::transport(format!("invalid api key header: {}", e)))?;
        headers.insert("apikey", api_key);

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| SyncError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| e.to_string())?;
        read_response(response)
    }

    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;
        read_response(response)
    }
}

fn read_response(response: reqwest::blocking::Response) -> Result<HttpResponse, String> {
    let status = response.status().as_u16();
    let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
    Ok(HttpResponse { status, body })
}

/// Typed access to the `ImportResources` and `IsImporting` endpoints.
pub struct ImportEndpoint<C: HttpClient> {
    client: C,
    import_url: String,
    status_url: String,
}

impl<C: HttpClient> ImportEndpoint<C> {
    /// Creates an endpoint for the URLs derived from settings.
    pub fn new(settings: &SyncSettings, client: C) -> Self {
        Self {
            client,
            import_url: settings.import_url(),
            status_url: settings.status_url(),
        }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the import URL.
    pub fn import_url(&self) -> &str {
        &self.import_url
    }

    /// Posts one batch. Returns whether the remote accepted it.
    pub fn post_batch(&self, records: &[ImportRecord]) -> SyncResult<bool> {
        let body = encode_batch(records)?;
        self.post_body(body, records.len())
    }

    /// Posts an already encoded batch of `count` records.
    ///
    /// Every error from here on comes from the remote side or the wire.
    pub fn post_body(&self, body: Vec<u8>, count: usize) -> SyncResult<bool> {
        let response = self
            .client
            .post_json(&self.import_url, body)
            .map_err(SyncError::transport)?;

        if !response.is_success() {
            return Err(SyncError::http_status(response.status, &self.import_url));
        }

        let accepted: bool = serde_json::from_slice(&response.body).map_err(|e| {
            SyncError::transport(format!("invalid import acknowledgement: {}", e))
        })?;
        debug!(accepted, count, "import batch acknowledged");
        Ok(accepted)
    }

    /// Queries the remote import status.
    pub fn status(&self) -> SyncResult<ImportStatus> {
        let response = self
            .client
            .get(&self.status_url)
            .map_err(SyncError::transport)?;

        if !response.is_success() {
            return Err(SyncError::http_status(response.status, &self.status_url));
        }

        Ok(ImportStatus::decode(&response.body)?)
    }
}

/// A recorded request made through a [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// `GET` or `POST`.
    pub method: &'static str,
    /// Request URL.
    pub url: String,
    /// Request body (empty for GET).
    pub body: Vec<u8>,
}

/// An HTTP client replaying scripted responses, for testing.
///
/// POST and GET responses are consumed from separate queues in order.
/// Running out of scripted responses is reported as a transport failure.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    posts: Mutex<VecDeque<Result<HttpResponse, String>>>,
    gets: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedClient {
    /// Creates a client with empty scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a POST response.
    pub fn push_post(&self, response: Result<HttpResponse, String>) {
        self.posts.lock().push_back(response);
    }

    /// Queues a GET response.
    pub fn push_get(&self, response: Result<HttpResponse, String>) {
        self.gets.lock().push_back(response);
    }

    /// Returns every request made so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Returns the bodies of every POST made so far.
    pub fn posted_bodies(&self) -> Vec<Vec<u8>> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == "POST")
            .map(|r| r.body.clone())
            .collect()
    }

    fn record(&self, method: &'static str, url: &str, body: Vec<u8>) {
        self.requests.lock().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
    }
}

impl HttpClient for ScriptedClient {
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        self.record("POST", url, body);
        self.posts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted POST response".into()))
    }

    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        self.record("GET", url, Vec::new());
        self.gets
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted GET response".into()))
    }
}

impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        (**self).post_json(url, body)
    }

    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        (**self).get(url)
    }
}
