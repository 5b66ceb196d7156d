//! # Mock Transports & Testing Guide
//!
//! Two ways to stand in for the network in tests.
//!
//! ## When to use which
//!
//! | Feature | `MockTransport` | `create_mock_transport` | `BackendActor` |
//! |---------|-----------------|-------------------------|----------------|
//! | **Answers** | Queued expectations | The test, by hand | Real in-memory state |
//! | **Timing** | Immediate | Whenever the test responds | Immediate |
//! | **Use Case** | One controller, scripted server | Ordering and supersession races | Several controllers, one backend |
//! | **Error Injection** | Easy (`return_status`, `return_err`) | Easy (send any result) | Only 400/404 |
//!
//! ## Pattern 0: Scripted responses
//!
//! ```rust
//! use nucleon::transport::mock::MockTransport;
//! use nucleon::transport::{Gateway, Method, Request};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     mock.expect(Method::Get, "/items/1")
//!         .return_json(200, json!({ "name": "a" }));
//!
//!     let gateway = Gateway::new(mock.clone());
//!     let response = gateway.fetch(Request::new(Method::Get, "/items/1")).await.unwrap();
//!     assert_eq!(response.body, Some(json!({ "name": "a" })));
//!
//!     mock.verify();
//! }
//! ```
//!
//! ## Pattern 1: Answering by hand
//!
//! ```rust
//! use nucleon::transport::mock::{create_mock_transport, expect_request};
//! use nucleon::transport::{Gateway, Method, Request, Response};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (transport, mut requests) = create_mock_transport(8);
//!     let gateway = Gateway::new(transport);
//!
//!     let call = tokio::spawn(async move {
//!         gateway.fetch(Request::new(Method::Delete, "/items/1")).await
//!     });
//!
//!     let pending = expect_request(&mut requests).await.expect("request");
//!     assert_eq!(pending.request.method, Method::Delete);
//!     pending.respond(Ok(Response::empty(204)));
//!
//!     assert!(call.await.unwrap().unwrap().is_success());
//! }
//! ```

use super::{Method, Request, Response, Transport};
use crate::error::TransportError;
use crate::sync::lock;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

/// One scripted exchange.
struct Expectation {
    method: Method,
    url: String,
    response: Result<Response, TransportError>,
}

#[derive(Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    requests: Vec<Request>,
    mismatches: Vec<String>,
}

/// A transport answering from a FIFO queue of expectations.
///
/// Requests that do not match the head of the queue fail with
/// [`TransportError::Unexpected`] and are reported by [`MockTransport::verify`].
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Expects a request with this method and URL next.
    pub fn expect(&self, method: Method, url: impl Into<String>) -> ExpectationBuilder {
        ExpectationBuilder {
            method,
            url: url.into(),
            state: self.state.clone(),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Panics unless every expectation was consumed and nothing unexpected arrived.
    pub fn verify(&self) {
        let state = self.lock();
        if !state.mismatches.is_empty() {
            panic!("Unexpected requests: {:?}", state.mismatches);
        }
        if !state.expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                state.expectations.len()
            );
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        let expectation = state.expectations.pop_front();
        match expectation {
            Some(expected) if expected.method == request.method && expected.url == request.url => {
                expected.response
            }
            Some(expected) => {
                let mismatch = format!(
                    "got {} {}, expected {} {}",
                    request.method, request.url, expected.method, expected.url
                );
                state.mismatches.push(mismatch.clone());
                Err(TransportError::Unexpected(mismatch))
            }
            None => {
                let mismatch = format!("got {} {}, expected nothing", request.method, request.url);
                state.mismatches.push(mismatch.clone());
                Err(TransportError::Unexpected(mismatch))
            }
        }
    }
}

/// Builder for a single expectation.
pub struct ExpectationBuilder {
    method: Method,
    url: String,
    state: Arc<Mutex<MockState>>,
}

impl ExpectationBuilder {
    fn push(self, response: Result<Response, TransportError>) {
        let mut state = lock(&self.state);
        state.expectations.push_back(Expectation {
            method: self.method,
            url: self.url,
            response,
        });
    }

    /// Answers with a JSON body.
    pub fn return_json(self, status: u16, body: Value) {
        self.push(Ok(Response::json(status, body)));
    }

    /// Answers with a status and no body.
    pub fn return_status(self, status: u16) {
        self.push(Ok(Response::empty(status)));
    }

    /// Fails at the transport level.
    pub fn return_err(self, error: TransportError) {
        self.push(Err(error));
    }
}

// =============================================================================
// CHANNEL TRANSPORT
// =============================================================================

/// A request waiting for someone to answer it.
#[derive(Debug)]
pub struct PendingRequest {
    pub request: Request,
    pub respond_to: oneshot::Sender<Result<Response, TransportError>>,
}

impl PendingRequest {
    /// Completes the request. A caller that already went away is ignored.
    pub fn respond(self, outcome: Result<Response, TransportError>) {
        let _ = self.respond_to.send(outcome);
    }
}

/// A transport that forwards every request over a channel and waits for the answer.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<PendingRequest>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<PendingRequest>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PendingRequest {
                request,
                respond_to,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        response.await.map_err(|_| TransportError::Dropped)?
    }
}

/// Creates a channel transport and the receiver the test answers from.
///
/// Requests stay pending until the test calls [`PendingRequest::respond`], which makes
/// the order of responses fully deterministic.
pub fn create_mock_transport(buffer_size: usize) -> (ChannelTransport, mpsc::Receiver<PendingRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ChannelTransport::new(sender), receiver)
}

/// Waits for the next request.
pub async fn expect_request(receiver: &mut mpsc::Receiver<PendingRequest>) -> Option<PendingRequest> {
    receiver.recv().await
}
