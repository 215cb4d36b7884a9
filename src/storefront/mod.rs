//! Terminal storefront built on the query cache.
//!
//! Two pages share one header:
//!
//! - **Shop**: the product catalog next to the caller's cart
//! - **Admin**: sales statistics and discount code generation
//!
//! Every server resource is read through a [`Query`] subscription, so the
//! storefront only ever renders the latest [`CacheEntry`] it was sent. Writes
//! go through the [`MutationCoordinator`]; the entries they invalidate are
//! refetched by the cache and arrive here as ordinary messages.

mod view;

use std::collections::HashMap;
use std::time::Duration;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{
    AddCartItem, AdminStats, CartLine, Checkout, GenerateDiscount, GetCart, ListProducts,
    RemoveCartItem, SetCartItem,
};
use crate::application::Application;
use crate::command::{Action, Command};
use crate::error::ApiError;
use crate::model::{Cart, GeneratedDiscount, Product, Stats};
use crate::settings::SettingsStore;
use crate::subscription::http::{CacheEntry, MutationCoordinator, MutationState, Query, QueryCache, Tag};
use crate::subscription::terminal::TerminalEvents;
use crate::subscription::time::Timer;
use crate::subscription::Subscription;

const DEFAULT_SWEEP_EVERY: Duration = Duration::from_secs(15);

/// Startup data for [`Storefront`].
#[derive(Debug, Clone)]
pub struct Flags {
    pub cache: QueryCache,
    /// How often unobserved cache entries are swept.
    pub sweep_every: Duration,
    /// Whether to read key presses from the terminal. Off in tests, where
    /// key events are sent as messages instead.
    pub terminal_events: bool,
}

impl Flags {
    #[must_use]
    pub const fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            sweep_every: DEFAULT_SWEEP_EVERY,
            terminal_events: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Shop,
    Admin,
}

impl Page {
    pub const ALL: [Self; 2] = [Self::Shop, Self::Admin];

    pub const fn title(self) -> &'static str {
        match self {
            Self::Shop => "Shop",
            Self::Admin => "Admin",
        }
    }

    const fn next(self) -> Self {
        match self {
            Self::Shop => Self::Admin,
            Self::Admin => Self::Shop,
        }
    }
}

/// Which shop pane receives the arrow keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pane {
    #[default]
    Products,
    Cart,
}

/// A text field the user is typing into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    UserId,
    AdminKey,
    DiscountCode,
}

impl Field {
    pub const fn label(self) -> &'static str {
        match self {
            Self::UserId => "User ID",
            Self::AdminKey => "Admin Key",
            Self::DiscountCode => "Discount code",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    pub field: Field,
    pub buffer: String,
}

#[derive(Debug)]
pub enum Message {
    Terminal(Event),
    Products(CacheEntry<Vec<Product>>),
    Cart(CacheEntry<Cart>),
    Stats(CacheEntry<Stats>),
    Added(Result<(), ApiError>),
    LineUpdated(Result<(), ApiError>),
    CheckedOut(Result<Value, ApiError>),
    Generated(Result<GeneratedDiscount, ApiError>),
    Sweep,
}

/// The storefront state.
#[derive(Debug)]
pub struct Storefront {
    cache: QueryCache,
    mutations: MutationCoordinator,
    sweep_every: Duration,
    terminal_events: bool,

    page: Page,
    pane: Pane,
    selected_product: usize,
    selected_line: usize,
    /// Quantity to add per product; absent means 1.
    add_quantities: HashMap<u64, u32>,
    discount_code: String,
    editor: Option<Editor>,

    products: Option<CacheEntry<Vec<Product>>>,
    cart: Option<CacheEntry<Cart>>,
    stats: Option<CacheEntry<Stats>>,

    add: MutationState<()>,
    line_update: MutationState<()>,
    checkout: MutationState<Value>,
    generate: MutationState<GeneratedDiscount>,
    status: String,
}

impl Storefront {
    pub const fn page(&self) -> Page {
        self.page
    }

    pub const fn pane(&self) -> Pane {
        self.pane
    }

    pub const fn editor(&self) -> Option<&Editor> {
        self.editor.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn discount_code(&self) -> &str {
        &self.discount_code
    }

    pub fn settings(&self) -> &SettingsStore {
        self.cache.api().settings()
    }

    pub const fn add_state(&self) -> &MutationState<()> {
        &self.add
    }

    pub const fn checkout_state(&self) -> &MutationState<Value> {
        &self.checkout
    }

    pub const fn generate_state(&self) -> &MutationState<GeneratedDiscount> {
        &self.generate
    }

    /// Quantity the next add of `product_id` will request.
    pub fn add_quantity(&self, product_id: u64) -> u32 {
        self.add_quantities.get(&product_id).copied().unwrap_or(1)
    }

    fn product_list(&self) -> &[Product] {
        self.products
            .as_ref()
            .and_then(CacheEntry::data)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn cart_value(&self) -> Option<&Cart> {
        self.cart.as_ref().and_then(CacheEntry::data)
    }

    fn selected_product_id(&self) -> Option<u64> {
        self.product_list()
            .get(self.selected_product)
            .map(|product| product.id)
    }

    fn selected_cart_line(&self) -> Option<CartLine> {
        self.cart_value()
            .and_then(|cart| cart.items.get(self.selected_line))
            .map(|item| CartLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
    }

    fn handle_key(&mut self, key: KeyEvent) -> Command<Message> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Command::effect(Action::Quit);
        }
        if self.editor.is_some() {
            return self.edit(key.code);
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Command::effect(Action::Quit),
            KeyCode::Tab => {
                self.page = self.page.next();
                Command::none()
            }
            KeyCode::Char('u') => self.open_editor(Field::UserId),
            KeyCode::Char('k') => self.open_editor(Field::AdminKey),
            _ => match self.page {
                Page::Shop => self.shop_key(key.code),
                Page::Admin => self.admin_key(key.code),
            },
        }
    }

    fn shop_key(&mut self, code: KeyCode) -> Command<Message> {
        match (self.pane, code) {
            (_, KeyCode::Left | KeyCode::Char('h')) => {
                self.pane = Pane::Products;
                Command::none()
            }
            (_, KeyCode::Right | KeyCode::Char('l')) => {
                self.pane = Pane::Cart;
                Command::none()
            }
            (_, KeyCode::Char('d')) => self.open_editor(Field::DiscountCode),
            (_, KeyCode::Char('c')) => self.place_order(),
            (Pane::Products, KeyCode::Up) => {
                self.selected_product = self.selected_product.saturating_sub(1);
                Command::none()
            }
            (Pane::Products, KeyCode::Down) => {
                let last = self.product_list().len().saturating_sub(1);
                self.selected_product = (self.selected_product + 1).min(last);
                Command::none()
            }
            (Pane::Products, KeyCode::Char('+' | '=')) => {
                self.adjust_add_quantity(1);
                Command::none()
            }
            (Pane::Products, KeyCode::Char('-')) => {
                self.adjust_add_quantity(-1);
                Command::none()
            }
            (Pane::Products, KeyCode::Enter | KeyCode::Char('a')) => self.add_selected(),
            (Pane::Cart, KeyCode::Up) => {
                self.selected_line = self.selected_line.saturating_sub(1);
                Command::none()
            }
            (Pane::Cart, KeyCode::Down) => {
                let last = self
                    .cart_value()
                    .map_or(0, |cart| cart.items.len().saturating_sub(1));
                self.selected_line = (self.selected_line + 1).min(last);
                Command::none()
            }
            (Pane::Cart, KeyCode::Char('+' | '=')) => self.step_line(1),
            (Pane::Cart, KeyCode::Char('-')) => self.step_line(-1),
            (Pane::Cart, KeyCode::Delete | KeyCode::Char('x')) => self.remove_line(),
            _ => Command::none(),
        }
    }

    fn admin_key(&mut self, code: KeyCode) -> Command<Message> {
        match code {
            KeyCode::Char('g') => {
                self.generate = MutationState::Pending;
                self.mutations
                    .command::<GenerateDiscount, _>((), Message::Generated)
            }
            KeyCode::Char('r') => {
                self.cache.refetch::<AdminStats>(&());
                Command::none()
            }
            _ => Command::none(),
        }
    }

    fn open_editor(&mut self, field: Field) -> Command<Message> {
        let settings = self.settings().get();
        let buffer = match field {
            Field::UserId => settings.user_id,
            Field::AdminKey => settings.admin_key,
            Field::DiscountCode => self.discount_code.clone(),
        };
        self.editor = Some(Editor { field, buffer });
        Command::none()
    }

    fn edit(&mut self, code: KeyCode) -> Command<Message> {
        let Some(editor) = self.editor.as_mut() else {
            return Command::none();
        };
        match code {
            KeyCode::Char(c) => editor.buffer.push(c),
            KeyCode::Backspace => {
                editor.buffer.pop();
            }
            KeyCode::Esc => self.editor = None,
            KeyCode::Enter => {
                if let Some(editor) = self.editor.take() {
                    self.commit(editor);
                }
            }
            _ => {}
        }
        Command::none()
    }

    fn commit(&mut self, editor: Editor) {
        let value = editor.buffer.trim().to_string();
        match editor.field {
            Field::UserId => {
                if value == self.settings().get().user_id {
                    return;
                }
                info!(user_id = %value, "switching user");
                self.settings().set_user_id(value);
                // Requests already in flight keep the old identity; cached
                // data for it must not be shown as current.
                self.cache.invalidate(&[Tag::Cart, Tag::Stats]);
                self.selected_line = 0;
            }
            Field::AdminKey => {
                if value == self.settings().get().admin_key {
                    return;
                }
                self.settings().set_admin_key(value);
                self.cache.invalidate(&[Tag::Stats]);
            }
            Field::DiscountCode => self.discount_code = value,
        }
    }

    fn adjust_add_quantity(&mut self, delta: i64) {
        let Some(product_id) = self.selected_product_id() else {
            return;
        };
        let current = i64::from(self.add_quantity(product_id));
        let next = u32::try_from((current + delta).max(1)).unwrap_or(1);
        self.add_quantities.insert(product_id, next);
    }

    fn add_selected(&mut self) -> Command<Message> {
        let Some(product_id) = self.selected_product_id() else {
            return Command::none();
        };
        let line = CartLine {
            product_id,
            quantity: self.add_quantity(product_id),
        };
        debug!(product_id, quantity = line.quantity, "adding to cart");
        self.add = MutationState::Pending;
        self.mutations.command::<AddCartItem, _>(line, Message::Added)
    }

    fn step_line(&mut self, delta: i64) -> Command<Message> {
        let Some(line) = self.selected_cart_line() else {
            return Command::none();
        };
        let quantity = u32::try_from((i64::from(line.quantity) + delta).max(0)).unwrap_or(0);
        self.line_update = MutationState::Pending;
        self.mutations.command::<SetCartItem, _>(
            CartLine {
                product_id: line.product_id,
                quantity,
            },
            Message::LineUpdated,
        )
    }

    fn remove_line(&mut self) -> Command<Message> {
        let Some(line) = self.selected_cart_line() else {
            return Command::none();
        };
        self.line_update = MutationState::Pending;
        self.mutations
            .command::<RemoveCartItem, _>(line.product_id, Message::LineUpdated)
    }

    fn place_order(&mut self) -> Command<Message> {
        if self.cart_value().is_none_or(Cart::is_empty) {
            self.status = "Cart is empty.".to_string();
            return Command::none();
        }
        self.checkout = MutationState::Pending;
        let code = Some(self.discount_code.clone()).filter(|code| !code.is_empty());
        self.mutations
            .command::<Checkout, _>(code, Message::CheckedOut)
    }

    fn clamp_selection(&mut self) {
        let products = self.product_list().len();
        self.selected_product = self.selected_product.min(products.saturating_sub(1));
        let lines = self.cart_value().map_or(0, |cart| cart.items.len());
        self.selected_line = self.selected_line.min(lines.saturating_sub(1));
    }
}

/// Text shown after a generate attempt.
pub fn generate_message(state: &MutationState<GeneratedDiscount>) -> Option<String> {
    match state {
        MutationState::Succeeded(code) => Some(format!(
            "Code: {} ({}%) @ {}",
            code.code,
            code.discount_pct,
            code.created_at.format("%Y-%m-%d %H:%M:%S")
        )),
        MutationState::Failed(err) => Some(
            err.detail()
                .map_or_else(|| "Not eligible or active code exists".to_string(), ToString::to_string),
        ),
        MutationState::Pending => Some("Generating...".to_string()),
        MutationState::Idle => None,
    }
}

impl Application for Storefront {
    type Message = Message;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<Message>) {
        let mutations = MutationCoordinator::new(flags.cache.clone());
        let app = Self {
            cache: flags.cache,
            mutations,
            sweep_every: flags.sweep_every,
            terminal_events: flags.terminal_events,
            page: Page::default(),
            pane: Pane::default(),
            selected_product: 0,
            selected_line: 0,
            add_quantities: HashMap::new(),
            discount_code: String::new(),
            editor: None,
            products: None,
            cart: None,
            stats: None,
            add: MutationState::default(),
            line_update: MutationState::default(),
            checkout: MutationState::default(),
            generate: MutationState::default(),
            status: String::new(),
        };
        (app, Command::none())
    }

    fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Terminal(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                return self.handle_key(key);
            }
            Message::Terminal(_) => {}
            Message::Products(entry) => {
                self.products = Some(entry);
                self.clamp_selection();
            }
            Message::Cart(entry) => {
                self.cart = Some(entry);
                self.clamp_selection();
            }
            Message::Stats(entry) => self.stats = Some(entry),
            Message::Added(result) => {
                self.status = match &result {
                    Ok(()) => "Added to cart.".to_string(),
                    Err(err) => format!("Add failed: {err}"),
                };
                self.add = MutationState::from_result(result);
            }
            Message::LineUpdated(result) => {
                self.status = match &result {
                    Ok(()) => "Cart updated.".to_string(),
                    Err(err) => format!("Update failed: {err}"),
                };
                self.line_update = MutationState::from_result(result);
            }
            Message::CheckedOut(result) => {
                self.status = match &result {
                    Ok(_) => {
                        self.discount_code.clear();
                        "Order placed.".to_string()
                    }
                    Err(err) => format!("Checkout failed: {err}"),
                };
                self.checkout = MutationState::from_result(result);
            }
            Message::Generated(result) => {
                self.generate = MutationState::from_result(result);
            }
            Message::Sweep => {
                let evicted = self.cache.evict_unused();
                if evicted > 0 {
                    debug!(evicted, "swept unused cache entries");
                }
            }
        }
        Command::none()
    }

    fn view(&self, frame: &mut Frame<'_>) {
        view::render(self, frame);
    }

    fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let mut subs = vec![Subscription::new(Timer::every(self.sweep_every)).map(|_| Message::Sweep)];

        if self.terminal_events {
            subs.push(Subscription::new(TerminalEvents::new()).map(Message::Terminal));
        }

        match self.page {
            Page::Shop => {
                subs.push(
                    Subscription::new(Query::<ListProducts>::new((), self.cache.clone()))
                        .map(Message::Products),
                );
                subs.push(
                    Subscription::new(Query::<GetCart>::new((), self.cache.clone())).map(Message::Cart),
                );
            }
            Page::Admin => {
                subs.push(
                    Subscription::new(Query::<AdminStats>::new((), self.cache.clone()))
                        .map(Message::Stats),
                );
            }
        }

        subs
    }
}
