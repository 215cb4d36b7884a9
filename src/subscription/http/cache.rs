use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::ApiError;
use crate::transport::ApiRequest;

use super::query::QueryKey;
use super::tags::Tag;

pub(super) type AnyValue = Arc<dyn Any + Send + Sync>;
pub(super) type Listener = Arc<dyn Fn(&EntryView) + Send + Sync>;
pub(super) type Decoder = fn(Value) -> Result<AnyValue, ApiError>;

/// Freshness state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Created but never fetched.
    Uninitialized,
    /// A fetch is in flight. Any previous value is still available.
    Loading,
    /// The value reflects the server as of the last fetch.
    Fresh,
    /// The value may be outdated and is scheduled for refetch.
    Stale,
    /// The last fetch failed. Any previous value is still available.
    Error,
}

/// Snapshot of a cache entry, as returned by reads and passed to listeners.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: QueryKey,
    /// Last successfully fetched value.
    pub value: Option<T>,
    pub status: EntryStatus,
    /// Error of the most recent failed fetch, cleared by the next success.
    pub error: Option<ApiError>,
    pub tags: &'static [Tag],
    pub subscriber_count: usize,
}

impl<T> CacheEntry<T> {
    /// Returns the value if one was ever fetched.
    pub const fn data(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.status == EntryStatus::Loading
    }

    pub fn is_fresh(&self) -> bool {
        self.status == EntryStatus::Fresh
    }

    pub fn is_stale(&self) -> bool {
        self.status == EntryStatus::Stale
    }

    pub fn is_error(&self) -> bool {
        self.status == EntryStatus::Error
    }
}

impl<T: Clone + 'static> CacheEntry<T> {
    pub(super) fn from_view(view: &EntryView) -> Self {
        Self {
            key: view.key.clone(),
            value: view
                .value
                .as_ref()
                .and_then(|value| value.downcast_ref::<T>().cloned()),
            status: view.status,
            error: view.error.clone(),
            tags: view.tags,
            subscriber_count: view.subscriber_count,
        }
    }
}

/// Type-erased snapshot handed to listeners.
#[derive(Clone)]
pub(super) struct EntryView {
    pub key: QueryKey,
    pub status: EntryStatus,
    pub value: Option<AnyValue>,
    pub error: Option<ApiError>,
    pub tags: &'static [Tag],
    pub subscriber_count: usize,
}

/// How to (re)fetch an entry without knowing its value type.
#[derive(Clone)]
pub(super) struct Loader {
    pub request: ApiRequest,
    pub decode: Decoder,
}

/// Decodes a JSON body into `T` and erases its type.
pub(super) fn decode_as<T>(value: Value) -> Result<AnyValue, ApiError>
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    serde_json::from_value::<T>(value)
        .map(|data| Arc::new(data) as AnyValue)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

/// Mutable state of one cache entry.
pub(super) struct Slot {
    pub status: EntryStatus,
    pub value: Option<AnyValue>,
    pub error: Option<ApiError>,
    pub tags: &'static [Tag],
    pub listeners: Vec<(u64, Listener)>,
    /// Sequence number of the most recently dispatched fetch.
    pub latest_seq: u64,
    /// Sequence number of the fetch whose response is still awaited.
    pub in_flight: Option<u64>,
    /// Set when an invalidation lands while a fetch is in flight.
    pub invalidated_in_flight: bool,
    pub fetched_at: Option<Instant>,
    pub idle_since: Instant,
    pub loader: Loader,
}

impl Slot {
    pub fn new(tags: &'static [Tag], loader: Loader) -> Self {
        Self {
            status: EntryStatus::Uninitialized,
            value: None,
            error: None,
            tags,
            listeners: Vec::new(),
            latest_seq: 0,
            in_flight: None,
            invalidated_in_flight: false,
            fetched_at: None,
            idle_since: Instant::now(),
            loader,
        }
    }

    pub fn view(&self, key: &QueryKey) -> EntryView {
        EntryView {
            key: key.clone(),
            status: self.status,
            value: self.value.clone(),
            error: self.error.clone(),
            tags: self.tags,
            subscriber_count: self.listeners.len(),
        }
    }

    pub fn listeners(&self) -> Vec<Listener> {
        self.listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Ages a fresh entry out once `stale_time` has elapsed.
    ///
    /// Returns `true` if the entry turned stale.
    pub fn check_staleness(&mut self, stale_time: Option<Duration>) -> bool {
        let (Some(stale_time), Some(fetched_at)) = (stale_time, self.fetched_at) else {
            return false;
        };
        if self.status == EntryStatus::Fresh && fetched_at.elapsed() > stale_time {
            self.status = EntryStatus::Stale;
            return true;
        }
        false
    }

    /// Marks the entry stale.
    ///
    /// An entry with a fetch in flight keeps its status and remembers the
    /// invalidation instead, so the pending response cannot land as fresh.
    /// Returns `true` if the status changed.
    pub fn mark_stale(&mut self) -> bool {
        if self.in_flight.is_some() {
            self.invalidated_in_flight = true;
            return false;
        }
        match self.status {
            EntryStatus::Fresh | EntryStatus::Error => {
                self.status = EntryStatus::Stale;
                true
            }
            EntryStatus::Uninitialized | EntryStatus::Loading | EntryStatus::Stale => false,
        }
    }

    /// Starts a new fetch and returns its sequence number.
    pub fn begin_fetch(&mut self) -> u64 {
        self.latest_seq += 1;
        self.in_flight = Some(self.latest_seq);
        self.invalidated_in_flight = false;
        self.status = EntryStatus::Loading;
        self.latest_seq
    }

    /// Applies a fetch result.
    ///
    /// Returns `false` without touching the entry if `seq` was superseded.
    pub fn complete(&mut self, seq: u64, result: Result<AnyValue, ApiError>) -> bool {
        if seq != self.latest_seq {
            return false;
        }
        self.in_flight = None;
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.error = None;
                self.fetched_at = Some(Instant::now());
                self.status = if self.invalidated_in_flight {
                    EntryStatus::Stale
                } else {
                    EntryStatus::Fresh
                };
            }
            Err(err) => {
                self.error = Some(err);
                self.status = EntryStatus::Error;
            }
        }
        self.invalidated_in_flight = false;
        true
    }

    /// Checks if this entry may be dropped from the cache.
    pub fn should_evict(&self, keep_unused_for: Duration) -> bool {
        self.listeners.is_empty()
            && self.in_flight.is_none()
            && self.idle_since.elapsed() >= keep_unused_for
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const TAGS: &[Tag] = &[Tag::Cart];

    fn slot() -> Slot {
        Slot::new(
            TAGS,
            Loader {
                request: ApiRequest::get("cart/"),
                decode: decode_as::<i32>,
            },
        )
    }

    fn value(n: i32) -> AnyValue {
        Arc::new(n)
    }

    #[test]
    fn test_new_slot() {
        let slot = slot();
        assert_eq!(slot.status, EntryStatus::Uninitialized);
        assert!(slot.value.is_none());
        assert!(!slot.has_subscribers());
    }

    #[test]
    fn test_fetch_lifecycle() {
        let mut slot = slot();
        let seq = slot.begin_fetch();
        assert_eq!(slot.status, EntryStatus::Loading);
        assert_eq!(slot.in_flight, Some(seq));

        assert!(slot.complete(seq, Ok(value(42))));
        assert_eq!(slot.status, EntryStatus::Fresh);
        assert_eq!(slot.in_flight, None);
    }

    #[test]
    fn test_error_keeps_previous_value() {
        let mut slot = slot();
        let seq = slot.begin_fetch();
        slot.complete(seq, Ok(value(1)));

        let seq = slot.begin_fetch();
        slot.complete(seq, Err(ApiError::Network("down".to_string())));

        assert_eq!(slot.status, EntryStatus::Error);
        let view = slot.view(&QueryKey::new("cart", "()"));
        let entry = CacheEntry::<i32>::from_view(&view);
        assert_eq!(entry.value, Some(1));
        assert_eq!(entry.error, Some(ApiError::Network("down".to_string())));
    }

    #[test]
    fn test_superseded_result_is_discarded() {
        let mut slot = slot();
        let first = slot.begin_fetch();
        let second = slot.begin_fetch();

        assert!(slot.complete(second, Ok(value(2))));
        assert!(!slot.complete(first, Ok(value(1))));

        let entry = CacheEntry::<i32>::from_view(&slot.view(&QueryKey::new("cart", "()")));
        assert_eq!(entry.value, Some(2));
        assert_eq!(entry.status, EntryStatus::Fresh);
    }

    #[test]
    fn test_mark_stale() {
        let mut slot = slot();
        assert!(!slot.mark_stale(), "uninitialized entries have nothing to invalidate");

        let seq = slot.begin_fetch();
        slot.complete(seq, Ok(value(1)));
        assert!(slot.mark_stale());
        assert_eq!(slot.status, EntryStatus::Stale);
        assert!(!slot.mark_stale());
    }

    #[test]
    fn test_invalidation_during_flight_lands_stale() {
        let mut slot = slot();
        let seq = slot.begin_fetch();

        assert!(!slot.mark_stale());
        assert!(slot.invalidated_in_flight);

        slot.complete(seq, Ok(value(1)));
        assert_eq!(slot.status, EntryStatus::Stale);
        assert!(!slot.invalidated_in_flight);
    }

    #[test]
    fn test_check_staleness() {
        let mut slot = slot();
        let seq = slot.begin_fetch();
        slot.complete(seq, Ok(value(1)));

        assert!(!slot.check_staleness(None));
        assert!(!slot.check_staleness(Some(Duration::from_secs(60))));

        sleep(Duration::from_millis(10));
        assert!(slot.check_staleness(Some(Duration::from_millis(5))));
        assert_eq!(slot.status, EntryStatus::Stale);
    }

    #[test]
    fn test_should_evict() {
        let mut slot = slot();
        assert!(slot.should_evict(Duration::ZERO));

        slot.begin_fetch();
        assert!(!slot.should_evict(Duration::ZERO), "in-flight entries are kept");
    }

    #[test]
    fn test_decode_as() {
        let decoded = decode_as::<Vec<u32>>(serde_json::json!([1, 2])).expect("should decode");
        assert_eq!(decoded.downcast_ref::<Vec<u32>>(), Some(&vec![1, 2]));

        let err = decode_as::<Vec<u32>>(serde_json::json!({"a": 1})).err();
        assert!(matches!(err, Some(ApiError::Decode(_))));
    }
}
