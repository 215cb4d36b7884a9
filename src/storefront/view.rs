use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap};

use super::{Page, Pane, Storefront, generate_message};
use crate::model::{Cart, Product, Stats};
use crate::subscription::http::{CacheEntry, EntryStatus};

const CURRENCY: &str = "₹";

pub(super) fn render(app: &Storefront, frame: &mut Frame<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs and settings
            Constraint::Min(1),    // Page
            Constraint::Length(3), // Status or editor
            Constraint::Length(1), // Key help
        ])
        .split(frame.area());

    render_header(app, frame, chunks[0]);
    match app.page {
        Page::Shop => render_shop(app, frame, chunks[1]),
        Page::Admin => render_admin(app, frame, chunks[1]),
    }
    render_status(app, frame, chunks[2]);

    let help = match app.page {
        Page::Shop => "Tab: admin  ←/→: pane  +/-: quantity  Enter: add  x: remove  d: code  c: checkout  u/k: settings  q: quit",
        Page::Admin => "Tab: shop  g: generate code  r: refresh  u/k: settings  q: quit",
    };
    frame.render_widget(Paragraph::new(help).style(Style::default().fg(Color::DarkGray)), chunks[3]);
}

fn render_header(app: &Storefront, frame: &mut Frame<'_>, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(40)])
        .split(area);

    let selected = Page::ALL.iter().position(|page| *page == app.page).unwrap_or(0);
    let tabs = Tabs::new(Page::ALL.iter().map(|page| page.title()))
        .select(selected)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title("shopsync"));
    frame.render_widget(tabs, chunks[0]);

    let settings = app.settings().get();
    let key = if settings.admin_key.is_empty() { "unset" } else { "set" };
    let summary = Paragraph::new(format!("User: {}  Admin key: {key}", settings.user_id))
        .block(Block::default().borders(Borders::ALL).title("Settings"));
    frame.render_widget(summary, chunks[1]);
}

/// Block title for a query-backed panel.
fn panel_title<T>(name: &str, entry: Option<&CacheEntry<T>>) -> String {
    match entry {
        Some(entry) if entry.value.is_some() => match entry.status {
            EntryStatus::Loading | EntryStatus::Stale => format!("{name} (refreshing)"),
            EntryStatus::Error => format!("{name} (outdated)"),
            EntryStatus::Uninitialized | EntryStatus::Fresh => name.to_string(),
        },
        _ => name.to_string(),
    }
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    let block = Block::default().borders(Borders::ALL).title(title);
    if focused {
        block.border_style(Style::default().fg(Color::Cyan))
    } else {
        block
    }
}

/// Placeholder for a panel whose query has produced no value yet.
fn placeholder<T>(entry: Option<&CacheEntry<T>>, what: &str) -> Option<Paragraph<'static>> {
    match entry {
        Some(entry) if entry.value.is_some() => None,
        Some(entry) if entry.status == EntryStatus::Error => {
            let reason = entry
                .error
                .as_ref()
                .and_then(|err| err.detail().map(ToString::to_string));
            let text = match reason {
                Some(reason) => format!("Failed to load {what}: {reason}"),
                None => format!("Failed to load {what}."),
            };
            Some(
                Paragraph::new(text)
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: true }),
            )
        }
        _ => Some(Paragraph::new(format!("Loading {what}…"))),
    }
}

fn render_shop(app: &Storefront, frame: &mut Frame<'_>, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    render_products(app, frame, chunks[0]);
    render_cart(app, frame, chunks[1]);
}

fn render_products(app: &Storefront, frame: &mut Frame<'_>, area: Rect) {
    let entry = app.products.as_ref();
    let block = panel_block(panel_title("Products", entry), app.pane == Pane::Products);

    if let Some(placeholder) = placeholder(entry, "products") {
        frame.render_widget(placeholder.block(block), area);
        return;
    }

    let items: Vec<ListItem> = app
        .product_list()
        .iter()
        .map(|product| {
            ListItem::new(format!(
                "{}  {CURRENCY} {}  qty {}",
                product.name,
                product.price,
                app.add_quantity(product.id)
            ))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_symbol("> ")
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));
    let mut state = ListState::default().with_selected(Some(app.selected_product));
    frame.render_stateful_widget(list, area, &mut state);
}

fn product_name(products: &[Product], product_id: u64) -> String {
    products
        .iter()
        .find(|product| product.id == product_id)
        .map_or_else(|| format!("Product #{product_id}"), |product| product.name.clone())
}

fn render_cart(app: &Storefront, frame: &mut Frame<'_>, area: Rect) {
    let entry = app.cart.as_ref();
    let block = panel_block(panel_title("Cart", entry), app.pane == Pane::Cart);

    if let Some(placeholder) = placeholder(entry, "cart") {
        frame.render_widget(placeholder.block(block), area);
        return;
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(inner);

    let cart = app.cart_value().cloned().unwrap_or_default();
    if cart.is_empty() {
        frame.render_widget(Paragraph::new("Cart is empty."), chunks[0]);
    } else {
        render_cart_lines(app, &cart, frame, chunks[0]);
    }

    let code = if app.discount_code.is_empty() {
        "none".to_string()
    } else {
        app.discount_code.clone()
    };
    let summary = Paragraph::new(vec![
        Line::from(format!("Total: {CURRENCY} {}", cart.total)).bold(),
        Line::from(format!("Discount code: {code}")),
        Line::from("Set quantity to 0 to remove.").style(Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(summary, chunks[1]);
}

fn render_cart_lines(app: &Storefront, cart: &Cart, frame: &mut Frame<'_>, area: Rect) {
    let products = app.product_list();
    let items: Vec<ListItem> = cart
        .items
        .iter()
        .map(|item| {
            ListItem::new(format!(
                "{}  x{}",
                product_name(products, item.product_id),
                item.quantity
            ))
        })
        .collect();

    let list = List::new(items).highlight_symbol("> ");
    let mut state = ListState::default();
    if app.pane == Pane::Cart {
        state.select(Some(app.selected_line));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_admin(app: &Storefront, frame: &mut Frame<'_>, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Generate
            Constraint::Length(6), // Totals
            Constraint::Min(1),    // Codes
        ])
        .split(area);

    let message = generate_message(&app.generate).unwrap_or_else(|| "Press g to generate a code.".to_string());
    let style = if app.generate.is_error() {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    frame.render_widget(
        Paragraph::new(message)
            .style(style)
            .block(Block::default().borders(Borders::ALL).title("Generate Discount")),
        chunks[0],
    );

    let entry = app.stats.as_ref();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(panel_title("Stats", entry));
    if let Some(placeholder) = placeholder(entry, "stats") {
        let hint = Line::from("Requires correct X-Admin-Key.").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(placeholder.block(block), chunks[1]);
        frame.render_widget(Paragraph::new(hint), chunks[2]);
        return;
    }
    let Some(stats) = entry.and_then(CacheEntry::data) else {
        return;
    };

    frame.render_widget(stats_totals(stats).block(block), chunks[1]);

    let codes: Vec<ListItem> = stats
        .discount_codes
        .iter()
        .map(|code| {
            let (label, color) = if code.used {
                ("USED", Color::DarkGray)
            } else {
                ("ACTIVE", Color::Green)
            };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{}  {}%  ", code.code, code.discount_pct)),
                Span::styled(label, Style::default().fg(color)),
            ]))
        })
        .collect();
    frame.render_widget(
        List::new(codes).block(Block::default().borders(Borders::ALL).title("Discount Codes")),
        chunks[2],
    );
}

fn stats_totals(stats: &Stats) -> Paragraph<'static> {
    Paragraph::new(vec![
        Line::from(format!("Items purchased: {}", stats.items_purchased)),
        Line::from(format!("Gross: {CURRENCY} {}", stats.gross_amount)),
        Line::from(format!("Total discount: {CURRENCY} {}", stats.total_discount_amount)),
        Line::from(format!("Net: {CURRENCY} {}", stats.net_amount)).bold(),
    ])
}

fn render_status(app: &Storefront, frame: &mut Frame<'_>, area: Rect) {
    let widget = match &app.editor {
        Some(editor) => Paragraph::new(format!("{}▏", editor.buffer)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(format!("{} (Enter: save, Esc: cancel)", editor.field.label())),
        ),
        None => Paragraph::new(app.status.as_str())
            .block(Block::default().borders(Borders::ALL).title("Status")),
    };
    frame.render_widget(widget, area);
}
