use std::time::Duration;

/// Configuration for query cache behavior.
///
/// Entries stay fresh until a mutation invalidates one of their tags. The
/// optional `stale_time` additionally ages them out on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long a fresh entry may be served before a read marks it stale.
    ///
    /// `None` keeps entries fresh until invalidated.
    pub stale_time: Option<Duration>,

    /// How long an entry without subscribers is retained.
    ///
    /// Entries idle for longer are dropped by
    /// [`QueryCache::evict_unused`](super::QueryCache::evict_unused).
    pub keep_unused_for: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: None,
            keep_unused_for: Duration::from_secs(60),
        }
    }
}

impl QueryConfig {
    /// Creates a new query configuration with the given stale and retention times.
    #[must_use]
    pub const fn new(stale_time: Option<Duration>, keep_unused_for: Duration) -> Self {
        Self {
            stale_time,
            keep_unused_for,
        }
    }
}
