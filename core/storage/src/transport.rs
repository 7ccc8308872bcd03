//! HTTP transport collaborator.
//!
//! Providers never talk to the network directly. They build an
//! [`HttpRequest`], hand it to an [`HttpTransport`], and classify whatever
//! comes back into the typed error taxonomy. Retries, backoff and timeouts
//! belong to the transport implementation.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use reqwest::{header, Client, Method};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use omnistore_common::{Error, OperationKind, Result};

use crate::stream::ByteStream;

/// HTTP and WebDAV verbs used by the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    Delete,
    Propfind,
    Mkcol,
    Copy,
    Move,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Propfind => "PROPFIND",
            HttpMethod::Mkcol => "MKCOL",
            HttpMethod::Copy => "COPY",
            HttpMethod::Move => "MOVE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body.
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Stream { stream: ByteStream, size: Option<u64> },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Stream { size, .. } => write!(f, "Stream(size: {:?})", size),
        }
    }
}

/// Outbound request.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    pub fn stream_body(mut self, stream: ByteStream, size: Option<u64>) -> Self {
        self.body = RequestBody::Stream { stream, size };
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response as seen by providers. The body is consumed at most once.
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body: ByteStream,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Box::pin(stream::empty()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        self.body = Box::pin(stream::once(async move { Ok(body) }));
        self
    }

    pub fn with_stream(mut self, body: ByteStream) -> Self {
        self.body = body;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Report body read failures as errors of `kind` instead of `Download`.
    fn body_errors_as(mut self, kind: OperationKind) -> Self {
        if kind != OperationKind::Download {
            self.body = Box::pin(self.body.map(move |chunk| {
                chunk.map_err(|e| match e {
                    Error::Download { status, message } => Error::operation(kind, status, message),
                    other => other,
                })
            }));
        }
        self
    }

    pub fn into_stream(self) -> ByteStream {
        self.body
    }

    pub async fn bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Failure to obtain any response at all.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timeout: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
        }
    }
}

/// The network collaborator every HTTP-speaking backend is built on.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Send a request and classify the outcome.
///
/// A status listed in `expects` is returned as-is. A 404 outside `expects`
/// becomes `NotFound`; any other status, and any transport failure, becomes
/// the error of `kind` (transport failures carry no status).
pub async fn make_request(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    expects: &[u16],
    kind: OperationKind,
) -> Result<HttpResponse> {
    let method = request.method;
    let url = request.url.clone();
    debug!(%method, %url, "Sending request");

    let response = transport.send(request).await.map_err(|e| {
        warn!(%method, %url, timeout = e.timeout, error = %e, "Transport failure");
        Error::operation(kind, None, format!("{} {} failed: {}", method, url, e))
    })?;

    if expects.contains(&response.status) {
        return Ok(response.body_errors_as(kind));
    }

    let status = response.status;
    let body = response.text().await.unwrap_or_default();
    warn!(%method, %url, status, "Unexpected response");
    if status == 404 {
        return Err(Error::NotFound(url));
    }
    Err(Error::operation(
        kind,
        Some(status),
        format!("{} {} returned {}: {}", method, url, status, body.trim()),
    ))
}

/// Default transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("omnistore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (timeouts, proxies, retries middleware).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::new(format!("Invalid method: {}", e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream { stream, size } => {
                if let Some(size) = size {
                    builder = builder.header(header::CONTENT_LENGTH, size);
                }
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        };

        let response = builder.send().await.map_err(|e| TransportError {
            message: e.to_string(),
            timeout: e.is_timeout(),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                Error::operation(OperationKind::Download, None, format!("Stream read error: {}", e))
            })
        });

        Ok(HttpResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
