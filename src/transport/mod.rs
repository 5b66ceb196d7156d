//! # Transport Gateway
//!
//! Everything a controller sends goes through a [`Gateway`]: a pluggable [`Transport`]
//! that performs the request, fronted by an ordered chain of [`Interceptor`]s that see
//! every request before it leaves.
//!
//! ## Main Components
//!
//! - [`Transport`] - Performs one request (see [`HttpTransport`] for the real network).
//! - [`Interceptor`] - Observes, rewrites, or answers a request before it is sent.
//! - [`Gateway`] - Cheap-to-clone handle combining the two.
//!
//! ## Testing
//!
//! - [`mock::MockTransport`] answers from a queue of expectations.
//! - [`mock::create_mock_transport`] hands each request to the test, which answers it
//!   whenever it likes (useful for ordering races).
//! - [`memory::BackendActor`] is a small in-memory hypermedia server several controllers
//!   can share.

pub mod http;
pub mod memory;
pub mod mock;

pub use http::{HttpTransport, TransportConfig};

use crate::error::TransportError;
use crate::sync::lock;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Media type sent in `Accept` with every controller request.
pub const HAL_JSON: &str = "application/hal+json";

/// The four methods the controller ever issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request, fully visible to interceptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any previous value under the same (case-insensitive) name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Attaches a JSON body and its content type.
    pub fn with_json(self, body: Value) -> Self {
        let mut request = self.with_header("Content-Type", "application/json");
        request.body = Some(body);
        request
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What came back: a status and an optional JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Option<Value>,
}

impl Response {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status, Some(body))
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, None)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single request.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError>;
}

/// Sees every request before it is sent.
///
/// Returning `None` lets the request continue down the chain (possibly rewritten);
/// returning `Some` answers it and nothing further runs, the transport included.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, request: &mut Request) -> Option<Result<Response, TransportError>>;
}

/// Adapts a closure into an [`Interceptor`].
///
/// ```
/// use nucleon::transport::{interceptor_fn, Method, Response};
/// use serde_json::json;
///
/// let cache = interceptor_fn(|request| {
///     (request.method == Method::Get && request.url == "/cached")
///         .then(|| Ok(Response::json(200, json!({ "cached": true }))))
/// });
/// # let _ = cache;
/// ```
pub fn interceptor_fn<F>(f: F) -> FnInterceptor<F>
where
    F: Fn(&mut Request) -> Option<Result<Response, TransportError>> + Send + Sync + 'static,
{
    FnInterceptor(f)
}

pub struct FnInterceptor<F>(F);

#[async_trait]
impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&mut Request) -> Option<Result<Response, TransportError>> + Send + Sync + 'static,
{
    async fn intercept(&self, request: &mut Request) -> Option<Result<Response, TransportError>> {
        (self.0)(request)
    }
}

/// Records every request that reaches it and lets it through.
#[derive(Clone, Default)]
pub struct RequestLog {
    entries: Arc<Mutex<Vec<Request>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Request> {
        lock(&self.entries).clone()
    }

    /// How many logged requests used `method`.
    pub fn count(&self, method: Method) -> usize {
        self.entries()
            .iter()
            .filter(|request| request.method == method)
            .count()
    }
}

#[async_trait]
impl Interceptor for RequestLog {
    async fn intercept(&self, request: &mut Request) -> Option<Result<Response, TransportError>> {
        lock(&self.entries).push(request.clone());
        None
    }
}

/// The transport plus its interceptor chain. Clones share both.
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Gateway {
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Arc::new(transport),
            interceptors: Vec::new(),
        }
    }

    /// Appends an interceptor; it runs after the ones already registered.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Runs the interceptor chain, then the transport.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn fetch(&self, mut request: Request) -> Result<Response, TransportError> {
        if request.url.is_empty() {
            return Err(TransportError::MissingUrl);
        }
        for interceptor in &self.interceptors {
            if let Some(outcome) = interceptor.intercept(&mut request).await {
                debug!("Answered by interceptor");
                return outcome;
            }
        }
        debug!("Sending request");
        self.transport.fetch(request).await
    }
}
