use ratatui::Frame;

use crate::{command::Command, subscription::Subscription};

/// A terminal application in the Elm style: state, messages, update, view.
///
/// All state changes happen in [`update`](Application::update), one message
/// at a time. Network completions, key presses and cache notifications all
/// arrive as messages, so the application never sees two of them at once.
///
/// # Example
///
/// ```
/// use ratatui::Frame;
/// use shopsync::{application::Application, command::Command, subscription::Subscription};
///
/// enum Message {
///     Add,
/// }
///
/// struct Basket {
///     items: u32,
/// }
///
/// impl Application for Basket {
///     type Message = Message;
///     type Flags = u32;
///
///     fn new(items: u32) -> (Self, Command<Message>) {
///         (Basket { items }, Command::none())
///     }
///
///     fn update(&mut self, msg: Message) -> Command<Message> {
///         match msg {
///             Message::Add => self.items += 1,
///         }
///         Command::none()
///     }
///
///     fn view(&self, _frame: &mut Frame<'_>) {}
///
///     fn subscriptions(&self) -> Vec<Subscription<Message>> {
///         vec![]
///     }
/// }
/// ```
pub trait Application: Sized {
    /// Everything that can happen to the application.
    type Message: Send + 'static;

    /// Data passed to [`new`](Application::new). Use `()` if none is needed.
    type Flags: Send;

    /// Builds the initial state and a command to run at startup.
    fn new(flags: Self::Flags) -> (Self, Command<Self::Message>);

    /// Applies `msg` to the state and returns the follow-up work.
    fn update(&mut self, msg: Self::Message) -> Command<Self::Message>;

    /// Renders the current state. Must not mutate anything.
    fn view(&self, frame: &mut Frame<'_>);

    /// Event sources the current state wants.
    ///
    /// Called after every update. Subscriptions are matched by id, so
    /// returning the same subscription again keeps it running.
    fn subscriptions(&self) -> Vec<Subscription<Self::Message>>;
}
