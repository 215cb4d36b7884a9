//! Long-lived event sources feeding the runtime.
//!
//! An application declares its subscriptions from its current state on every
//! update. The runtime diffs them by [`SubscriptionId`]: new ones are started,
//! vanished ones are cancelled, and unchanged ones keep running.

pub mod http;
pub mod terminal;
pub mod time;

use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::command::Action;

/// Identity of a subscription, used to decide whether it is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    source: TypeId,
    hash: u64,
}

impl SubscriptionId {
    /// An id for source type `S` with parameters hashed to `hash`.
    #[must_use]
    pub fn of<S: 'static>(hash: u64) -> Self {
        Self {
            source: TypeId::of::<S>(),
            hash,
        }
    }
}

/// Something that can produce a stream of events.
pub trait SubscriptionSource: Send + 'static {
    type Output;

    /// Opens the stream. Called once, when the subscription starts.
    fn stream(&self) -> BoxStream<'static, Self::Output>;

    fn id(&self) -> SubscriptionId;
}

/// A subscription whose events are converted into messages of type `Msg`.
pub struct Subscription<Msg> {
    id: SubscriptionId,
    open: Box<dyn FnOnce() -> BoxStream<'static, Msg> + Send>,
}

impl<Msg: Send + 'static> Subscription<Msg> {
    pub fn new<S>(source: S) -> Self
    where
        S: SubscriptionSource<Output = Msg>,
    {
        Self {
            id: source.id(),
            open: Box::new(move || source.stream()),
        }
    }

    /// Converts every event with `f`. The id is unchanged.
    #[must_use]
    pub fn map<T, F>(self, f: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn(Msg) -> T + Send + 'static,
    {
        let open = self.open;
        Subscription {
            id: self.id,
            open: Box::new(move || open().map(f).boxed()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Handle for a running subscription task.
struct Handle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Handle {
    fn cancel(&self) {
        self.token.cancel();
    }

    fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Starts, keeps and stops subscriptions as the application's list changes.
pub(crate) struct SubscriptionManager<Msg> {
    running: HashMap<SubscriptionId, Handle>,
    tx: mpsc::UnboundedSender<Action<Msg>>,
}

impl<Msg: Send + 'static> SubscriptionManager<Msg> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Action<Msg>>) -> Self {
        Self {
            running: HashMap::new(),
            tx,
        }
    }

    /// Reconciles the running set with `subscriptions`.
    ///
    /// Duplicate ids are started once. Streams are opened synchronously, so
    /// any side effect of opening one has happened when this returns.
    pub(crate) fn update(&mut self, subscriptions: Vec<Subscription<Msg>>) {
        let wanted: HashSet<SubscriptionId> = subscriptions.iter().map(Subscription::id).collect();

        self.running.retain(|id, handle| {
            let keep = wanted.contains(id);
            if !keep {
                trace!(?id, "stopping subscription");
                handle.cancel();
            }
            keep
        });

        for subscription in subscriptions {
            if self.running.contains_key(&subscription.id) {
                continue;
            }
            let id = subscription.id;
            trace!(?id, "starting subscription");
            let handle = self.spawn(subscription);
            self.running.insert(id, handle);
        }
    }

    fn spawn(&self, subscription: Subscription<Msg>) -> Handle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let mut stream = (subscription.open)();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    item = stream.next() => match item {
                        Some(msg) => {
                            if tx.send(Action::Message(msg)).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Handle { token, join }
    }

    /// Number of subscriptions whose task is still running.
    pub(crate) fn active(&self) -> usize {
        self.running.values().filter(|handle| !handle.is_finished()).count()
    }

    /// Cancels every subscription.
    pub(crate) fn shutdown(&mut self) {
        for (_, handle) in self.running.drain() {
            handle.cancel();
        }
    }
}

impl<Msg> Drop for SubscriptionManager<Msg> {
    fn drop(&mut self) {
        for handle in self.running.values() {
            handle.token.cancel();
        }
    }
}
