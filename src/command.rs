use futures::{
    FutureExt, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// An action emitted by a command and carried out by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<Msg> {
    /// Deliver a message to the application's update function.
    Message(Msg),

    /// Stop the event loop and tear down subscriptions.
    Quit,
}

impl<Msg> Action<Msg> {
    fn map<T>(self, f: impl FnOnce(Msg) -> T) -> Action<T> {
        match self {
            Self::Message(msg) => Action::Message(f(msg)),
            Self::Quit => Action::Quit,
        }
    }
}

/// A side effect to be run by the runtime, producing zero or more actions.
///
/// Commands are returned from `Application::new` and `Application::update`.
/// Mutations against the shop API are the typical command:
///
/// ```
/// use shopsync::command::Command;
///
/// enum Message {
///     Saved(bool),
/// }
///
/// let cmd = Command::perform(async { Ok::<_, ()>(()) }, |result| Message::Saved(result.is_ok()));
/// ```
#[must_use = "commands do nothing unless returned to the runtime"]
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Action<Msg>>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// A command with no effect.
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Runs `future` and converts its output into a message with `f`.
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    /// Runs a future that produces a message directly.
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().map(Action::Message).boxed()),
        }
    }

    /// Delivers `msg` on the next turn of the event loop.
    pub fn message(msg: Msg) -> Self {
        Self::effect(Action::Message(msg))
    }

    /// Performs a single action.
    ///
    /// ```
    /// use shopsync::command::{Action, Command};
    ///
    /// let quit: Command<()> = Command::effect(Action::Quit);
    /// ```
    pub fn effect(action: Action<Msg>) -> Self {
        Self {
            stream: Some(stream::once(async move { action }).boxed()),
        }
    }

    /// Runs several commands concurrently.
    ///
    /// Messages arrive in completion order. `Command::none()` entries are
    /// dropped.
    pub fn batch(commands: impl IntoIterator<Item = Command<Msg>>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Converts every message this command produces with `f`.
    pub fn map<T: Send + 'static>(self, f: impl Fn(Msg) -> T + Send + 'static) -> Command<T> {
        Command {
            stream: self
                .stream
                .map(|stream| stream.map(move |action| action.map(&f)).boxed()),
        }
    }

    /// Returns `true` if this command has no effect.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }
}
