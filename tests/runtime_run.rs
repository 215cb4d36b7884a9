// Integration tests for Runtime::run.
// Unit tests for commands and the subscription manager live next to them.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use ratatui::{Frame, Terminal, backend::TestBackend, text::Text};
use shopsync::{
    application::Application,
    command::{Action, Command},
    runtime::Runtime,
    subscription::{Subscription, time::Timer},
};
use tokio::time::{Duration, Instant, sleep, timeout};

fn terminal() -> Terminal<TestBackend> {
    Terminal::new(TestBackend::new(40, 5)).unwrap()
}

struct InitQuitApp;

impl Application for InitQuitApp {
    type Message = ();
    type Flags = ();

    fn new(_flags: ()) -> (Self, Command<Self::Message>) {
        (Self, Command::effect(Action::Quit))
    }

    fn update(&mut self, _msg: Self::Message) -> Command<Self::Message> {
        Command::none()
    }

    fn view(&self, _frame: &mut Frame<'_>) {}

    fn subscriptions(&self) -> Vec<Subscription<Self::Message>> {
        vec![]
    }
}

#[tokio::test]
async fn test_quit_from_init_command() {
    let mut terminal = terminal();
    let runtime = Runtime::<InitQuitApp>::new(());

    let start = Instant::now();
    let result = timeout(Duration::from_secs(1), runtime.run(&mut terminal, 10)).await;

    assert!(result.is_ok(), "Runtime should quit within 1 second");
    assert!(result.unwrap().is_ok());
    // Quit does not wait for the next frame (100ms at 10 FPS).
    assert!(start.elapsed() < Duration::from_millis(100));
}

// Counts messages from its startup batch and renders the total.
struct Tally {
    received: Vec<String>,
}

impl Application for Tally {
    type Message = String;
    type Flags = usize;

    fn new(count: usize) -> (Self, Command<String>) {
        let cmd = Command::batch((0..count).map(|i| {
            Command::future(async move {
                sleep(Duration::from_millis(5)).await;
                format!("msg{i}")
            })
        }));
        (Self { received: vec![] }, cmd)
    }

    fn update(&mut self, msg: String) -> Command<String> {
        self.received.push(msg);
        if self.received.len() >= 3 {
            Command::effect(Action::Quit)
        } else {
            Command::none()
        }
    }

    fn view(&self, frame: &mut Frame<'_>) {
        frame.render_widget(Text::raw(format!("received {}", self.received.len())), frame.area());
    }

    fn subscriptions(&self) -> Vec<Subscription<String>> {
        vec![]
    }
}

#[tokio::test]
async fn test_messages_from_commands_reach_update() {
    let mut terminal = terminal();
    let runtime = Runtime::<Tally>::new(3);

    let result = timeout(Duration::from_secs(1), runtime.run(&mut terminal, 60)).await;

    assert!(result.is_ok());
    assert!(result.unwrap().is_ok());
}

#[tokio::test]
async fn test_view_is_drawn() {
    let mut terminal = terminal();
    // Never reaches three messages, so it runs until the timeout.
    let runtime = Runtime::<Tally>::new(1);

    let result = timeout(Duration::from_millis(200), runtime.run(&mut terminal, 60)).await;
    assert!(result.is_err(), "Runtime should still be running");

    let first_row: String = terminal.backend().buffer().content()[..10]
        .iter()
        .map(|cell| cell.symbol())
        .collect();
    assert_eq!(first_row, "received 1");
}

// Ticks until disabled, then quits after a pause.
struct Toggle {
    enabled: bool,
    ticks: Arc<AtomicU32>,
}

#[derive(Debug, Clone)]
enum ToggleMsg {
    Tick,
    Disable,
    Quit,
}

impl Application for Toggle {
    type Message = ToggleMsg;
    type Flags = Arc<AtomicU32>;

    fn new(ticks: Arc<AtomicU32>) -> (Self, Command<ToggleMsg>) {
        let cmd = Command::future(async {
            sleep(Duration::from_millis(60)).await;
            ToggleMsg::Disable
        });
        (Self { enabled: true, ticks }, cmd)
    }

    fn update(&mut self, msg: ToggleMsg) -> Command<ToggleMsg> {
        match msg {
            ToggleMsg::Tick => {
                self.ticks.fetch_add(1, Ordering::SeqCst);
                Command::none()
            }
            ToggleMsg::Disable => {
                self.enabled = false;
                Command::future(async {
                    sleep(Duration::from_millis(60)).await;
                    ToggleMsg::Quit
                })
            }
            ToggleMsg::Quit => Command::effect(Action::Quit),
        }
    }

    fn view(&self, _frame: &mut Frame<'_>) {}

    fn subscriptions(&self) -> Vec<Subscription<ToggleMsg>> {
        if self.enabled {
            vec![Subscription::new(Timer::every(Duration::from_millis(10))).map(|_| ToggleMsg::Tick)]
        } else {
            vec![]
        }
    }
}

#[tokio::test]
async fn test_dropped_subscription_stops() {
    let ticks = Arc::new(AtomicU32::new(0));
    let mut terminal = terminal();
    let runtime = Runtime::<Toggle>::new(ticks.clone());

    let result = timeout(Duration::from_secs(1), runtime.run(&mut terminal, 60)).await;
    assert!(result.is_ok());
    assert!(result.unwrap().is_ok());

    let counted = ticks.load(Ordering::SeqCst);
    assert!(counted > 0, "Timer should tick while enabled");
    // Ticks already queued may still arrive after the timer is cancelled.
    assert!(counted <= 8, "Timer should stop once disabled, got {counted}");
}
