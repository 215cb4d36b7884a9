//! Tag-aware query cache with request deduplication.
//!
//! This module provides the [`QueryCache`] and the [`Query`] subscription for
//! reading server resources, similar to SWR or TanStack Query.
//!
//! # Design Pattern: Subscription-based State Management
//!
//! A read is keyed by an [`Endpoint`] and its argument. The first read creates
//! the entry; as long as someone is subscribed, the cache keeps it current:
//!
//! 1. An uninitialized or stale entry with subscribers is fetched
//! 2. Concurrent reads of the same key share one in-flight request
//! 3. Invalidating a tag marks every entry carrying it stale and refetches
//!    the subscribed ones
//!
//! Each fetch takes a sequence number. Only the response to the most recently
//! dispatched fetch is applied, so an older response arriving late can never
//! overwrite a newer one.
//!
//! # Example
//!
//! ```rust,ignore
//! use shopsync::prelude::*;
//! use shopsync::api::GetCart;
//! use shopsync::subscription::http::{CacheEntry, Query, QueryCache};
//!
//! struct App {
//!     cache: QueryCache,
//!     cart: Option<CacheEntry<Cart>>,
//! }
//!
//! impl Application for App {
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         vec![Subscription::new(Query::<GetCart>::new((), self.cache.clone())).map(Message::Cart)]
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Cart(entry) => {
//!                 self.cart = Some(entry);
//!                 Command::none()
//!             }
//!         }
//!     }
//! }
//! ```

use std::fmt::{self, Debug};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::subscription::{SubscriptionId, SubscriptionSource};
use crate::transport::ApiRequest;

use super::cache::{AnyValue, CacheEntry, EntryStatus, EntryView, Listener, Loader, Slot, decode_as};
use super::config::QueryConfig;
use super::tags::{Tag, TagIndex};

/// A readable server resource.
///
/// Implementors are marker types; the argument identifies one instance of
/// the resource and becomes part of the cache key.
pub trait Endpoint: Send + Sync + 'static {
    type Arg: Debug + Clone + Send + Sync + 'static;
    type Output: DeserializeOwned + Clone + Send + Sync + 'static;

    /// Endpoint name, the first half of every cache key.
    const NAME: &'static str;

    /// Tags attached to every entry of this endpoint.
    const TAGS: &'static [Tag];

    fn request(arg: &Self::Arg) -> ApiRequest;
}

/// Identity of a cache entry: endpoint name plus serialized argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    endpoint: &'static str,
    arg: String,
}

impl QueryKey {
    #[must_use]
    pub fn new(endpoint: &'static str, arg: impl Into<String>) -> Self {
        Self {
            endpoint,
            arg: arg.into(),
        }
    }

    /// The key under which `E` caches `arg`.
    #[must_use]
    pub fn of<E: Endpoint>(arg: &E::Arg) -> Self {
        Self::new(E::NAME, format!("{arg:?}"))
    }

    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    #[must_use]
    pub fn arg(&self) -> &str {
        &self.arg
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.endpoint, self.arg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// Skip if a fetch is already in flight.
    Dedup,
    /// Always start a new fetch, superseding any in flight.
    Force,
}

struct CacheInner {
    entries: DashMap<QueryKey, Slot>,
    tags: TagIndex,
    api: ApiClient,
    config: QueryConfig,
    next_listener: AtomicU64,
}

/// Shared cache of query results.
///
/// Cloning is cheap; all clones share the same entries. Fetches run on the
/// ambient tokio runtime, so reads that trigger one must happen inside it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use shopsync::api::ApiClient;
/// use shopsync::mock::MockTransport;
/// use shopsync::settings::SettingsStore;
/// use shopsync::subscription::http::{QueryCache, QueryConfig};
///
/// let api = ApiClient::new(
///     "http://shop.test/api/",
///     SettingsStore::in_memory(),
///     Arc::new(MockTransport::new()),
/// );
/// let cache = QueryCache::with_config(api, QueryConfig::new(None, Duration::from_secs(300)));
/// assert!(cache.is_empty());
/// ```
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    /// Creates a new query cache with default configuration.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self::with_config(api, QueryConfig::default())
    }

    /// Creates a new query cache with the given configuration.
    #[must_use]
    pub fn with_config(api: ApiClient, config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                tags: TagIndex::new(),
                api,
                config,
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn tags(&self) -> &TagIndex {
        &self.inner.tags
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Status of the entry at `key`, if it exists.
    #[must_use]
    pub fn entry_status(&self, key: &QueryKey) -> Option<EntryStatus> {
        self.inner.entries.get(key).map(|slot| slot.status)
    }

    /// Returns the current snapshot of `E(arg)`, creating the entry if needed.
    ///
    /// Starts a fetch when the entry is uninitialized or stale, has at least
    /// one subscriber, and has no fetch in flight. Failed entries are not
    /// retried by reads; use [`refetch`](Self::refetch) or invalidate a tag.
    pub fn read<E: Endpoint>(&self, arg: &E::Arg) -> CacheEntry<E::Output> {
        let key = QueryKey::of::<E>(arg);
        let stale_time = self.inner.config.stale_time;

        let (aged, should_fetch) = self.with_slot::<E, _>(&key, arg, |slot| {
            let aged = slot
                .check_staleness(stale_time)
                .then(|| (slot.view(&key), slot.listeners()));
            let should_fetch = matches!(slot.status, EntryStatus::Uninitialized | EntryStatus::Stale)
                && slot.has_subscribers()
                && slot.in_flight.is_none();
            (aged, should_fetch)
        });

        if let Some((view, listeners)) = aged {
            trace!(key = %key, "entry aged out");
            notify(&listeners, &view);
        }
        if should_fetch {
            self.dispatch(&key, Dispatch::Dedup);
        }
        self.snapshot(&key)
    }

    /// Registers `listener` for every state change of `E(arg)`.
    ///
    /// The listener stays registered until the returned guard is dropped.
    /// Subscribing does not fetch; follow it with [`read`](Self::read).
    pub fn subscribe<E, F>(&self, arg: &E::Arg, listener: F) -> QuerySubscription
    where
        E: Endpoint,
        F: Fn(&CacheEntry<E::Output>) + Send + Sync + 'static,
    {
        let key = QueryKey::of::<E>(arg);
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(move |view: &EntryView| {
            listener(&CacheEntry::from_view(view));
        });

        let subscribers = self.with_slot::<E, _>(&key, arg, |slot| {
            slot.listeners.push((id, listener));
            slot.listeners.len()
        });
        debug!(key = %key, subscribers, "subscribed");

        QuerySubscription {
            cache: self.clone(),
            key,
            id,
        }
    }

    /// Fetches `E(arg)` regardless of its state.
    ///
    /// A fetch already in flight is superseded; its response will be
    /// discarded when it arrives.
    pub fn refetch<E: Endpoint>(&self, arg: &E::Arg) -> CacheEntry<E::Output> {
        let key = QueryKey::of::<E>(arg);
        self.with_slot::<E, _>(&key, arg, |_| ());
        self.dispatch(&key, Dispatch::Force);
        self.snapshot(&key)
    }

    /// Reads `E(arg)` and waits until it is fresh or failed.
    ///
    /// Holds a subscription for the duration of the call, so the fetch is
    /// started if needed. A failed entry is refetched once.
    ///
    /// # Errors
    ///
    /// Returns the error of the fetch that settled the entry.
    pub async fn fetch<E: Endpoint>(&self, arg: &E::Arg) -> Result<E::Output, ApiError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _subscription = self.subscribe::<E, _>(arg, move |entry| {
            let _ = tx.send(entry.clone());
        });
        let mut updates = UnboundedReceiverStream::new(rx);

        let mut entry = self.read::<E>(arg);
        if entry.is_error() {
            entry = self.refetch::<E>(arg);
        }

        loop {
            match entry.status {
                EntryStatus::Fresh => {
                    if let Some(value) = entry.value {
                        return Ok(value);
                    }
                }
                EntryStatus::Error => {
                    return Err(entry
                        .error
                        .unwrap_or_else(|| ApiError::Network("fetch failed".to_string())));
                }
                EntryStatus::Uninitialized | EntryStatus::Loading | EntryStatus::Stale => {}
            }
            entry = updates
                .next()
                .await
                .ok_or_else(|| ApiError::Network("cache entry dropped".to_string()))?;
        }
    }

    /// Marks every entry carrying one of `tags` stale.
    ///
    /// Subscribed entries are refetched right away. An entry with a fetch in
    /// flight keeps loading; its response lands stale and is followed by a
    /// refetch.
    pub fn invalidate(&self, tags: &[Tag]) {
        let keys = self.inner.tags.keys_for(tags);
        debug!(?tags, entries = keys.len(), "invalidating");

        for key in keys {
            let (changed, refetch) = {
                let Some(mut slot) = self.inner.entries.get_mut(&key) else {
                    continue;
                };
                let changed = slot
                    .mark_stale()
                    .then(|| (slot.view(&key), slot.listeners()));
                let refetch = slot.status == EntryStatus::Stale
                    && slot.in_flight.is_none()
                    && slot.has_subscribers();
                (changed, refetch)
            };

            if let Some((view, listeners)) = changed {
                notify(&listeners, &view);
            }
            if refetch {
                self.dispatch(&key, Dispatch::Dedup);
            }
        }
    }

    /// Drops entries that have had no subscribers for longer than
    /// `keep_unused_for`. Returns the number of entries dropped.
    pub fn evict_unused(&self) -> usize {
        let keep_unused_for = self.inner.config.keep_unused_for;
        let mut evicted = Vec::new();
        self.inner.entries.retain(|key, slot| {
            if slot.should_evict(keep_unused_for) {
                evicted.push((key.clone(), slot.tags));
                false
            } else {
                true
            }
        });

        for (key, tags) in &evicted {
            self.inner.tags.remove(key, tags);
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted unused entries");
        }
        evicted.len()
    }

    /// Runs `f` on the slot for `key`, creating it first if needed.
    fn with_slot<E, R>(&self, key: &QueryKey, arg: &E::Arg, f: impl FnOnce(&mut Slot) -> R) -> R
    where
        E: Endpoint,
    {
        let mut created = false;
        let result = {
            let mut slot = self.inner.entries.entry(key.clone()).or_insert_with(|| {
                created = true;
                Slot::new(
                    E::TAGS,
                    Loader {
                        request: E::request(arg),
                        decode: decode_as::<E::Output>,
                    },
                )
            });
            f(slot.value_mut())
        };

        if created {
            self.inner.tags.insert(key, E::TAGS);
            trace!(key = %key, tags = ?E::TAGS, "entry created");
        }
        result
    }

    fn snapshot<T: Clone + 'static>(&self, key: &QueryKey) -> CacheEntry<T> {
        self.inner.entries.get(key).map_or_else(
            || CacheEntry {
                key: key.clone(),
                value: None,
                status: EntryStatus::Uninitialized,
                error: None,
                tags: &[],
                subscriber_count: 0,
            },
            |slot| CacheEntry::from_view(&slot.view(key)),
        )
    }

    /// Starts a fetch for `key`. Returns `false` if none was started.
    ///
    /// The request is prepared before this returns, so it carries the
    /// credentials current at dispatch time.
    fn dispatch(&self, key: &QueryKey, mode: Dispatch) -> bool {
        let (seq, request, decode, view, listeners) = {
            let Some(mut slot) = self.inner.entries.get_mut(key) else {
                return false;
            };
            if let Some(previous) = slot.in_flight {
                if mode == Dispatch::Dedup {
                    trace!(key = %key, seq = previous, "fetch already in flight");
                    return false;
                }
                debug!(key = %key, superseded = previous, "superseding in-flight fetch");
            }
            let seq = slot.begin_fetch();
            let request = self.inner.api.prepare(&slot.loader.request);
            (seq, request, slot.loader.decode, slot.view(key), slot.listeners())
        };

        debug!(key = %key, seq, url = %request.url, "fetching");
        notify(&listeners, &view);

        let cache = self.clone();
        let key = key.clone();
        let response = self.inner.api.send(request);
        tokio::spawn(async move {
            let result = response.await.and_then(decode);
            cache.complete(&key, seq, result);
        });
        true
    }

    fn complete(&self, key: &QueryKey, seq: u64, result: Result<AnyValue, ApiError>) {
        if let Err(err) = &result {
            warn!(key = %key, seq, error = %err, "fetch failed");
        }

        let (view, listeners, refetch) = {
            let Some(mut slot) = self.inner.entries.get_mut(key) else {
                debug!(key = %key, seq, "entry gone before response arrived");
                return;
            };
            let invalidated = slot.invalidated_in_flight;
            if !slot.complete(seq, result) {
                debug!(key = %key, seq, latest = slot.latest_seq, "discarding superseded response");
                return;
            }
            let refetch = invalidated && slot.has_subscribers();
            (slot.view(key), slot.listeners(), refetch)
        };

        trace!(key = %key, seq, status = ?view.status, "fetch settled");
        notify(&listeners, &view);
        if refetch {
            self.dispatch(key, Dispatch::Dedup);
        }
    }

    fn unsubscribe(&self, key: &QueryKey, id: u64) {
        if let Some(mut slot) = self.inner.entries.get_mut(key) {
            slot.listeners.retain(|(listener, _)| *listener != id);
            if slot.listeners.is_empty() {
                slot.idle_since = Instant::now();
            }
            debug!(key = %key, subscribers = slot.listeners.len(), "unsubscribed");
        }
    }
}

fn notify(listeners: &[Listener], view: &EntryView) {
    for listener in listeners {
        listener(view);
    }
}

/// Keeps a cache listener registered. Dropping it unsubscribes.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct QuerySubscription {
    cache: QueryCache,
    key: QueryKey,
    id: u64,
}

impl QuerySubscription {
    #[must_use]
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Unsubscribes now rather than at end of scope.
    pub fn unsubscribe(self) {}
}

impl Debug for QuerySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key, self.id);
    }
}

/// A subscription that streams snapshots of `E(arg)`.
///
/// Emits the current snapshot first, then one snapshot per state change for
/// as long as the stream is alive. While subscribed the entry counts as
/// observed, so stale data is refetched automatically.
///
/// # Example
///
/// ```rust,ignore
/// use shopsync::api::ListProducts;
/// use shopsync::subscription::{Subscription, http::Query};
///
/// let products = Subscription::new(Query::<ListProducts>::new((), cache.clone()))
///     .map(Message::Products);
/// ```
pub struct Query<E: Endpoint> {
    arg: E::Arg,
    cache: QueryCache,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E: Endpoint> Query<E> {
    #[must_use]
    pub const fn new(arg: E::Arg, cache: QueryCache) -> Self {
        Self {
            arg,
            cache,
            _endpoint: PhantomData,
        }
    }
}

impl<E: Endpoint> SubscriptionSource for Query<E> {
    type Output = CacheEntry<E::Output>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = self.cache.subscribe::<E, _>(&self.arg, move |entry| {
            let _ = tx.send(entry.clone());
        });
        // A read that starts a fetch has already queued the loading snapshot.
        let snapshot = self.cache.read::<E>(&self.arg);
        let initial = rx.try_recv().unwrap_or(snapshot);

        stream::once(async move { initial })
            .chain(UnboundedReceiverStream::new(rx))
            .map(move |entry| {
                // The guard lives as long as the stream.
                let _guard = &subscription;
                entry
            })
            .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        QueryKey::of::<E>(&self.arg).hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}
