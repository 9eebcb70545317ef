//! Single-shot HTTP transport for the deployment-management API.
//!
//! The transport performs exactly one request per call and reports the raw
//! outcome. Retrying is the caller's business (see [`super::RetryPolicy`]).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;

use crate::error::{DeployError, TransportError};

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_ZIP: &str = "application/zip";
pub const ACCEPT_TEXT: &str = "text/plain";
pub const ACCEPT_ANY: &str = "*/*";

/// Default per-request timeout for JSON status calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for binary downloads and log retrieval.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(180);

/// Header naming the deployment action on `POST /deployments`.
pub const ACTION_TYPE_HEADER: &str = "Action-Type";

/// One request against the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub accept: &'static str,
    pub action_type: Option<&'static str>,
    pub form: Option<SubmitForm>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>, accept: &'static str) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            accept,
            action_type: None,
            form: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn post_form(url: impl Into<String>, form: SubmitForm) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            accept: ACCEPT_JSON,
            action_type: None,
            form: Some(form),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_action_type(mut self, action: &'static str) -> Self {
        self.action_type = Some(action);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Multipart submission body: one `json` metadata part plus file parts.
///
/// The form keeps owned bytes so the same submission can be re-encoded when a
/// caller decides to retry it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitForm {
    pub json: serde_json::Value,
    pub files: Vec<FilePart>,
}

impl SubmitForm {
    pub fn new(json: serde_json::Value) -> Self {
        Self {
            json,
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    fn to_multipart(&self) -> Result<Form, reqwest::Error> {
        let json = Part::text(self.json.to_string()).mime_str(ACCEPT_JSON)?;
        let mut form = Form::new().part("json", json);
        for file in &self.files {
            let part = Part::bytes(file.data.clone())
                .file_name(file.file_name.clone())
                .mime_str(file.content_type)?;
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

#[derive(Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

impl FilePart {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        let file_name = file_name.into();
        Self {
            field: field.into(),
            content_type: guess_content_type(&file_name),
            file_name,
            data,
        }
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

fn guess_content_type(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".zip") {
        "application/zip"
    } else if lower.ends_with(".properties") || lower.ends_with(".sql") || lower.ends_with(".ddl")
    {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

/// A successful (2xx) response, fully buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T, DeployError> {
        serde_json::from_slice(&self.body).map_err(|e| DeployError::InvalidResponse {
            context: context.to_string(),
            detail: format!("{} (body: {})", e, String::from_utf8_lossy(&self.body)),
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request. Never retries.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by a reqwest client carrying the credential headers.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(ACCEPT, request.accept)
            .timeout(request.timeout);

        if let Some(action) = request.action_type {
            builder = builder.header(ACTION_TYPE_HEADER, action);
        }

        if let Some(form) = &request.form {
            let multipart = form.to_multipart().map_err(|e| TransportError::Encoding {
                url: request.url.clone(),
                cause: describe(&e),
            })?;
            builder = builder.multipart(multipart);
        }

        let response = builder.send().await.map_err(|e| network(&request.url, &e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| network(&request.url, &e))?;

        if !status.is_success() {
            return Err(TransportError::Http {
                code: status.as_u16(),
                url: request.url.clone(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        debug!("{} {} -> {} ({} bytes)", request.method, request.url, status, body.len());

        Ok(ApiResponse {
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}

fn network(url: &str, error: &reqwest::Error) -> TransportError {
    TransportError::Network {
        url: url.to_string(),
        cause: describe(error),
    }
}

/// Flattens an error and its sources into one line.
fn describe(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
