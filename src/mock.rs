//! Mock transport for testing.
//!
//! [`MockTransport`] records every request and lets the test decide when and
//! how each one is answered, which makes in-flight races reproducible:
//!
//! ```
//! use std::sync::Arc;
//! use shopsync::api::{ApiClient, ListProducts};
//! use shopsync::mock::MockTransport;
//! use shopsync::settings::SettingsStore;
//! use shopsync::subscription::http::QueryCache;
//! use shopsync::transport::RawResponse;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = MockTransport::new();
//! let api = ApiClient::new("http://shop.test/api/", SettingsStore::in_memory(), Arc::new(transport.clone()));
//! let cache = QueryCache::new(api);
//!
//! let pending = tokio::spawn({
//!     let cache = cache.clone();
//!     async move { cache.fetch::<ListProducts>(&()).await }
//! });
//!
//! transport.wait_for_calls(1).await;
//! transport.respond(0, RawResponse::json(200, &serde_json::json!([])));
//!
//! let products = pending.await.unwrap().unwrap();
//! assert!(products.is_empty());
//! # }
//! ```
//!
//! A responder closure answers immediately instead, for tests that only care
//! about the end state:
//!
//! ```
//! use shopsync::mock::MockTransport;
//! use shopsync::transport::RawResponse;
//!
//! let transport = MockTransport::responding(|_request| Ok(RawResponse::no_content()));
//! assert_eq!(transport.call_count(), 0);
//! ```

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};

use crate::error::ApiError;
use crate::transport::{PreparedRequest, RawResponse, Transport};

type Responder = Arc<dyn Fn(&PreparedRequest) -> Result<RawResponse, ApiError> + Send + Sync>;
type Reply = oneshot::Sender<Result<RawResponse, ApiError>>;

struct Call {
    request: PreparedRequest,
    reply: Option<Reply>,
}

struct MockInner {
    calls: Mutex<Vec<Call>>,
    responder: Option<Responder>,
    arrived: Notify,
}

/// A transport whose responses are controlled by the test.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a transport that holds every call until answered.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a transport that answers every call with `responder`.
    #[must_use]
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&PreparedRequest) -> Result<RawResponse, ApiError> + Send + Sync + 'static,
    {
        Self::build(Some(Arc::new(responder)))
    }

    fn build(responder: Option<Responder>) -> Self {
        Self {
            inner: Arc::new(MockInner {
                calls: Mutex::new(Vec::new()),
                responder,
                arrived: Notify::new(),
            }),
        }
    }

    /// All requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.inner
            .calls
            .lock()
            .iter()
            .map(|call| call.request.clone())
            .collect()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().len()
    }

    /// Number of requests still waiting for an answer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|call| call.reply.is_some())
            .count()
    }

    /// Answers call `index` with `response`.
    ///
    /// Returns `false` if there is no such call or it was already answered.
    pub fn respond(&self, index: usize, response: RawResponse) -> bool {
        self.reply(index, Ok(response))
    }

    /// Fails call `index` with a transport error.
    pub fn fail(&self, index: usize, error: ApiError) -> bool {
        self.reply(index, Err(error))
    }

    fn reply(&self, index: usize, result: Result<RawResponse, ApiError>) -> bool {
        let reply = self
            .inner
            .calls
            .lock()
            .get_mut(index)
            .and_then(|call| call.reply.take());
        reply.is_some_and(|reply| reply.send(result).is_ok())
    }

    /// Waits until at least `count` requests have arrived.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let arrived = self.inner.arrived.notified();
            if self.call_count() >= count {
                return;
            }
            arrived.await;
        }
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: PreparedRequest) -> BoxFuture<'static, Result<RawResponse, ApiError>> {
        if let Some(responder) = &self.inner.responder {
            let result = responder(&request);
            self.inner.calls.lock().push(Call {
                request,
                reply: None,
            });
            self.inner.arrived.notify_waiters();
            return futures::future::ready(result).boxed();
        }

        let (tx, rx) = oneshot::channel();
        self.inner.calls.lock().push(Call {
            request,
            reply: Some(tx),
        });
        self.inner.arrived.notify_waiters();

        async move {
            rx.await.unwrap_or_else(|_| {
                Err(ApiError::Network(
                    "mock transport dropped the call".to_string(),
                ))
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Headers;
    use crate::transport::Method;

    fn request(url: &str) -> PreparedRequest {
        PreparedRequest {
            method: Method::Get,
            url: url.to_string(),
            headers: Headers::default(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_held_call_answered_by_index() {
        let transport = MockTransport::new();
        let first = transport.execute(request("a"));
        let second = transport.execute(request("b"));
        assert_eq!(transport.pending(), 2);

        assert!(transport.respond(1, RawResponse::new(200, "b")));
        assert!(transport.respond(0, RawResponse::new(200, "a")));
        assert!(!transport.respond(0, RawResponse::new(200, "again")));

        assert_eq!(second.await.expect("second").body, b"b".to_vec());
        assert_eq!(first.await.expect("first").body, b"a".to_vec());
        assert_eq!(transport.pending(), 0);
    }

    #[tokio::test]
    async fn test_fail() {
        let transport = MockTransport::new();
        let call = transport.execute(request("a"));
        transport.fail(0, ApiError::Network("reset".to_string()));
        assert_eq!(call.await, Err(ApiError::Network("reset".to_string())));
    }

    #[tokio::test]
    async fn test_responder() {
        let transport = MockTransport::responding(|request| {
            Ok(RawResponse::new(200, request.url.clone()))
        });
        let response = transport.execute(request("x")).await.expect("response");
        assert_eq!(response.body, b"x".to_vec());
        assert_eq!(transport.requests()[0].url, "x");
        assert_eq!(transport.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_calls() {
        let transport = MockTransport::new();
        let waiter = tokio::spawn({
            let transport = transport.clone();
            async move { transport.wait_for_calls(1).await }
        });
        let _call = transport.execute(request("a"));
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("should observe the call")
            .expect("waiter task");
    }
}
