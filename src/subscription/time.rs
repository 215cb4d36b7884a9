//! Periodic ticks.
//!
//! The storefront uses a [`Timer`] to sweep idle cache entries.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::IntervalStream;

use super::{SubscriptionId, SubscriptionSource};

/// Emitted by [`Timer`] once per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

/// A subscription that ticks at a fixed period.
///
/// Missed ticks are skipped rather than replayed, and there is no tick at
/// time zero.
///
/// ```
/// use std::time::Duration;
/// use shopsync::subscription::{Subscription, time::Timer};
///
/// enum Message {
///     Sweep,
/// }
///
/// let sweep = Subscription::new(Timer::every(Duration::from_secs(30))).map(|_| Message::Sweep);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timer {
    period: Duration,
}

impl Timer {
    /// A timer ticking every `period`. A zero period is raised to one millisecond.
    #[must_use]
    pub fn every(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }
}

impl SubscriptionSource for Timer {
    type Output = Tick;

    fn stream(&self) -> BoxStream<'static, Tick> {
        let mut interval = interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        IntervalStream::new(interval)
            .skip(1) // the first tick fires immediately
            .map(|_| Tick)
            .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[test]
    fn test_timer_id() {
        let a = Timer::every(Duration::from_secs(1));
        let b = Timer::every(Duration::from_secs(1));
        let c = Timer::every(Duration::from_secs(2));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_zero_period() {
        assert_eq!(Timer::every(Duration::ZERO).period(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_immediate_tick() {
        let mut stream = Timer::every(Duration::from_millis(100)).stream();

        let early = timeout(Duration::from_millis(50), stream.next()).await;
        assert!(early.is_err(), "should not tick before the first period");

        let tick = timeout(Duration::from_millis(100), stream.next()).await;
        assert_eq!(tick, Ok(Some(Tick)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_ticks() {
        let mut stream = Timer::every(Duration::from_millis(10)).stream();
        for _ in 0..3 {
            let tick = timeout(Duration::from_millis(50), stream.next()).await;
            assert_eq!(tick, Ok(Some(Tick)));
        }
    }
}
