use std::time::Duration;

use color_eyre::eyre::Result;
use futures::stream::StreamExt;
use ratatui::{Terminal, prelude::Backend};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::{
    application::Application,
    command::{Action, Command},
    subscription::SubscriptionManager,
};

/// Drives an [`Application`]: runs its commands and subscriptions, feeds the
/// resulting messages to `update` one at a time and redraws on a fixed
/// frame rate.
pub struct Runtime<A: Application> {
    app: A,
    init: Option<Command<A::Message>>,
    tx: mpsc::UnboundedSender<Action<A::Message>>,
    rx: mpsc::UnboundedReceiver<Action<A::Message>>,
    subscriptions: SubscriptionManager<A::Message>,
}

impl<A: Application> Runtime<A> {
    /// Initializes the application. Its startup command runs once
    /// [`run`](Self::run) starts.
    pub fn new(flags: A::Flags) -> Self {
        let (app, init) = A::new(flags);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new(tx.clone());

        Self {
            app,
            init: Some(init),
            tx,
            rx,
            subscriptions,
        }
    }

    /// The application state.
    pub const fn app(&self) -> &A {
        &self.app
    }

    fn execute(&self, cmd: Command<A::Message>) {
        let Some(mut stream) = cmd.stream else {
            return;
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(action) = stream.next().await {
                if tx.send(action).is_err() {
                    break;
                }
            }
        });
    }

    /// Applies one message. Returns `false` once the application asked to quit.
    fn dispatch(&mut self, action: Action<A::Message>) -> bool {
        match action {
            Action::Message(msg) => {
                let cmd = self.app.update(msg);
                self.execute(cmd);
                self.subscriptions.update(self.app.subscriptions());
                true
            }
            Action::Quit => false,
        }
    }

    /// Runs the event loop until the application emits [`Action::Quit`].
    ///
    /// Messages are applied as they arrive; the screen is redrawn at most
    /// `frame_rate` times per second, and only after something changed.
    ///
    /// # Errors
    ///
    /// Returns an error if drawing to the terminal fails.
    pub async fn run<B: Backend>(mut self, terminal: &mut Terminal<B>, frame_rate: u32) -> Result<()> {
        let frame = Duration::from_millis(1000 / u64::from(frame_rate.max(1)));
        let mut ticker = interval(frame);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if let Some(init) = self.init.take() {
            self.execute(init);
        }
        self.subscriptions.update(self.app.subscriptions());

        let mut dirty = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if dirty {
                        terminal.draw(|frame| self.app.view(frame))?;
                        dirty = false;
                    }
                }
                Some(action) = self.rx.recv() => {
                    if !self.dispatch(action) {
                        break;
                    }
                    dirty = true;
                }
            }
        }

        debug!(subscriptions = self.subscriptions.active(), "runtime stopping");
        self.subscriptions.shutdown();
        Ok(())
    }
}
