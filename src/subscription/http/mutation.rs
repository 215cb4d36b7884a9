//! Writes with declared cache invalidation.
//!
//! This module provides the [`Mutation`] trait and the [`MutationCoordinator`]
//! that runs mutations against the API, similar to mutations in TanStack Query.
//!
//! # Design Pattern: Transaction-based Operations
//!
//! Each mutation is a discrete side effect with a clear start and end, so it
//! is exposed both as a future ([`MutationCoordinator::mutate`]) and as a
//! [`Command`] ([`MutationCoordinator::command`]) for the Elm runtime.
//!
//! A mutation declares the tags it invalidates. When the server accepts the
//! write, every cache entry carrying one of those tags becomes stale and, if
//! observed, is refetched. A failed mutation leaves the cache untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use shopsync::prelude::*;
//! use shopsync::api::{AddCartItem, CartLine};
//!
//! fn update(&mut self, msg: Message) -> Command<Message> {
//!     match msg {
//!         Message::Add(product_id) => {
//!             self.add = MutationState::Pending;
//!             self.mutations.command::<AddCartItem, _>(
//!                 CartLine { product_id, quantity: 1 },
//!                 Message::Added,
//!             )
//!         }
//!         Message::Added(result) => {
//!             self.add = MutationState::from_result(result);
//!             Command::none()
//!         }
//!     }
//! }
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::command::Command;
use crate::error::ApiError;
use crate::transport::ApiRequest;

use super::query::QueryCache;
use super::tags::Tag;

/// A server write.
///
/// Implementors are marker types describing how to build the request and
/// which resources the write affects.
pub trait Mutation: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Name used in logs.
    const NAME: &'static str;

    /// Tags whose entries become stale once the server accepts the write.
    const INVALIDATES: &'static [Tag];

    fn request(input: &Self::Input) -> ApiRequest;

    /// Interprets a successful response body (`null` if it was empty).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] if the body does not have the expected shape.
    fn decode(body: Value) -> Result<Self::Output, ApiError>;
}

/// The state of a mutation, as tracked by a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MutationState<T> {
    /// Not started, or reset after completion.
    #[default]
    Idle,
    /// The request is in flight.
    Pending,
    /// The server accepted the write.
    Succeeded(T),
    /// The request failed. The error is the server's, untouched.
    Failed(ApiError),
}

impl<T> MutationState<T> {
    #[must_use]
    pub fn from_result(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(output) => Self::Succeeded(output),
            Err(err) => Self::Failed(err),
        }
    }

    /// Returns the output if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Succeeded(output) => Some(output),
            _ => None,
        }
    }

    /// Returns the error if the mutation failed, otherwise `None`.
    pub const fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns to [`Idle`](Self::Idle).
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }
}

/// Runs mutations and invalidates the cache on success.
#[derive(Debug, Clone)]
pub struct MutationCoordinator {
    api: ApiClient,
    cache: QueryCache,
}

impl MutationCoordinator {
    /// Creates a coordinator that sends through the cache's API client.
    #[must_use]
    pub fn new(cache: QueryCache) -> Self {
        Self {
            api: cache.api().clone(),
            cache,
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Sends `M` with `input`.
    ///
    /// The request, including its credentials, is built before this returns;
    /// settings changed while the future is pending do not affect it. On
    /// 2xx response every entry tagged with one of `M::INVALIDATES` is marked
    /// stale before the future resolves, even if the body then fails to decode.
    ///
    /// # Errors
    ///
    /// Returns the transport, HTTP or decode error unchanged. The cache is
    /// not touched on transport or HTTP errors.
    pub fn mutate<M: Mutation>(&self, input: M::Input) -> BoxFuture<'static, Result<M::Output, ApiError>> {
        let request = self.api.prepare(&M::request(&input));
        debug!(mutation = M::NAME, method = %request.method, url = %request.url, "mutating");

        let response = self.api.send(request);
        let cache = self.cache.clone();
        async move {
            let body = match response.await {
                Ok(body) => Ok(body),
                // The server accepted the write but sent an unreadable body.
                Err(err @ ApiError::Decode(_)) => Err(err),
                Err(err) => {
                    warn!(mutation = M::NAME, error = %err, "mutation failed");
                    return Err(err);
                }
            };
            debug!(mutation = M::NAME, tags = ?M::INVALIDATES, "mutation accepted");
            cache.invalidate(M::INVALIDATES);

            let result = body.and_then(M::decode);
            if let Err(err) = &result {
                warn!(mutation = M::NAME, error = %err, "mutation response not understood");
            }
            result
        }
        .boxed()
    }

    /// Wraps [`mutate`](Self::mutate) as a runtime command.
    ///
    /// The request is built when this is called, not when the runtime
    /// first polls the command.
    pub fn command<M, Msg>(
        &self,
        input: M::Input,
        f: impl FnOnce(Result<M::Output, ApiError>) -> Msg + Send + 'static,
    ) -> Command<Msg>
    where
        M: Mutation,
        Msg: Send + 'static,
    {
        Command::perform(self.mutate::<M>(input), f)
    }
}
