//! Test doubles shared by the backend test modules.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody, TransportError};

enum Outcome {
    Respond(HttpResponse),
    Fail(String),
    Stall,
}

/// A request as the mock saw it, with any body fully drained.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Transport returning canned responses, in order, per method and URL.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<HashMap<(HttpMethod, String), VecDeque<Outcome>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: HttpMethod, url: &str, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(outcome);
    }

    pub fn respond(&self, method: HttpMethod, url: &str, response: HttpResponse) {
        self.push(method, url, Outcome::Respond(response));
    }

    pub fn fail(&self, method: HttpMethod, url: &str, message: &str) {
        self.push(method, url, Outcome::Fail(message.to_string()));
    }

    /// Never answer; used to exercise cancellation.
    pub fn stall(&self, method: HttpMethod, url: &str) {
        self.push(method, url, Outcome::Stall);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let body = match request.body {
            RequestBody::Empty => None,
            RequestBody::Bytes(bytes) => Some(bytes),
            RequestBody::Stream { mut stream, .. } => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| TransportError::new(e.to_string()))?;
                    buffer.extend_from_slice(&chunk);
                }
                Some(buffer.freeze())
            }
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body,
        });

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(&(request.method, request.url.clone()))
            .and_then(|queue| queue.pop_front());

        match outcome {
            Some(Outcome::Respond(response)) => Ok(response),
            Some(Outcome::Fail(message)) => Err(TransportError::new(message)),
            Some(Outcome::Stall) => futures::future::pending().await,
            None => Err(TransportError::new(format!(
                "no canned response for {} {}",
                request.method, request.url
            ))),
        }
    }
}
