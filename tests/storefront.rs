// The storefront driven by the runtime against an in-memory shop.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod support;

use crossterm::event::{Event, KeyCode};
use ratatui::{Frame, Terminal, backend::TestBackend};
use shopsync::{
    application::Application,
    command::Command,
    runtime::Runtime,
    storefront::{Flags, Message, Storefront},
    subscription::Subscription,
    subscription::http::QueryCache,
};
use support::{Shop, user};
use tokio::time::{Duration, sleep, timeout};

/// A storefront that receives `script` as key presses, each after its delay
/// in milliseconds from startup.
struct Scripted {
    inner: Storefront,
}

impl Application for Scripted {
    type Message = Message;
    type Flags = (QueryCache, Vec<(u64, KeyCode)>);

    fn new((cache, script): Self::Flags) -> (Self, Command<Message>) {
        let flags = Flags {
            terminal_events: false,
            ..Flags::new(cache)
        };
        let (inner, init) = Storefront::new(flags);
        let keys = script.into_iter().map(|(delay, code)| {
            Command::future(async move {
                sleep(Duration::from_millis(delay)).await;
                Message::Terminal(Event::Key(code.into()))
            })
        });
        (Self { inner }, Command::batch(std::iter::once(init).chain(keys)))
    }

    fn update(&mut self, msg: Message) -> Command<Message> {
        self.inner.update(msg)
    }

    fn view(&self, frame: &mut Frame<'_>) {
        self.inner.view(frame);
    }

    fn subscriptions(&self) -> Vec<Subscription<Message>> {
        self.inner.subscriptions()
    }
}

fn screen(terminal: &Terminal<TestBackend>) -> String {
    let buffer = terminal.backend().buffer();
    let width = usize::from(buffer.area.width);
    buffer
        .content()
        .chunks(width)
        .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_catalog_and_cart_load_on_start() {
    let shop = Shop::new();
    shop.seed_cart("u1", 7, 2);
    let (cache, _) = shop.connect(user("u1"));
    let mut terminal = Terminal::new(TestBackend::new(120, 24)).unwrap();

    let runtime = Runtime::<Scripted>::new((cache, vec![(200, KeyCode::Char('q'))]));
    let result = timeout(Duration::from_secs(2), runtime.run(&mut terminal, 60)).await;
    assert!(result.is_ok(), "Runtime should quit on q");
    assert!(result.unwrap().is_ok());

    let text = screen(&terminal);
    assert!(text.contains("Almonds 500g"));
    assert!(text.contains("Honey 250g  x2"));
    assert!(text.contains("Total: ₹ 641.00"));
    assert!(text.contains("User: u1"));
    assert_eq!(shop.requests_to("products/"), 1);
    assert_eq!(shop.requests_to("cart/"), 1);
}

#[tokio::test]
async fn test_add_to_cart_refreshes_cart() {
    let shop = Shop::new();
    let (cache, _) = shop.connect(user("u1"));
    let mut terminal = Terminal::new(TestBackend::new(120, 24)).unwrap();

    let script = vec![
        (100, KeyCode::Down),
        (120, KeyCode::Char('+')),
        (140, KeyCode::Enter),
        (400, KeyCode::Char('q')),
    ];
    let runtime = Runtime::<Scripted>::new((cache, script));
    let result = timeout(Duration::from_secs(2), runtime.run(&mut terminal, 60)).await;
    assert!(result.unwrap().is_ok());

    assert_eq!(shop.quantity("u1", 5), 2);
    assert_eq!(shop.requests_to("cart/"), 2);

    let text = screen(&terminal);
    assert!(text.contains("Green Tea  x2"));
    assert!(text.contains("Added to cart."));
}

#[tokio::test]
async fn test_admin_tab_fetches_stats_only_when_shown() {
    let shop = Shop::new();
    let (cache, _) = shop.connect(user("u1"));
    let mut terminal = Terminal::new(TestBackend::new(120, 24)).unwrap();

    let script = vec![(100, KeyCode::Tab), (300, KeyCode::Char('q'))];
    let runtime = Runtime::<Scripted>::new((cache, script));
    let result = timeout(Duration::from_secs(2), runtime.run(&mut terminal, 60)).await;
    assert!(result.unwrap().is_ok());

    // No admin key: the server refuses and the panel says why.
    assert_eq!(shop.requests_to("admin/stats/"), 1);
    let text = screen(&terminal);
    assert!(text.contains("Failed to load stats: Invalid admin key."));
}
