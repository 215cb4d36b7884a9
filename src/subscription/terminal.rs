//! Keyboard and resize events from the terminal.

use std::hash::{DefaultHasher, Hash, Hasher};

use crossterm::event::{Event, EventStream};
use futures::{StreamExt, stream::BoxStream};
use tracing::warn;

use super::{SubscriptionId, SubscriptionSource};

/// Terminal events read through crossterm's `EventStream`.
///
/// The stream ends at the first read error, which is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TerminalEvents;

impl TerminalEvents {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SubscriptionSource for TerminalEvents {
    type Output = Event;

    fn stream(&self) -> BoxStream<'static, Event> {
        EventStream::new()
            .take_while(|event| {
                if let Err(err) = event {
                    warn!(error = %err, "terminal event stream failed");
                }
                futures::future::ready(event.is_ok())
            })
            .filter_map(|event| futures::future::ready(event.ok()))
            .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        "terminal".hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}
