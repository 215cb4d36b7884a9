//! An in-memory shop server behind [`MockTransport`].

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use shopsync::api::ApiClient;
use shopsync::credentials::{ADMIN_KEY_HEADER, USER_ID_HEADER};
use shopsync::mock::MockTransport;
use shopsync::settings::SettingsStore;
use shopsync::subscription::http::{MutationCoordinator, QueryCache};
use shopsync::transport::{Method, PreparedRequest, RawResponse};
use tokio::time::{Duration, timeout};

pub const BASE: &str = "http://shop.test/api/";
pub const ADMIN_KEY: &str = "letmein";
const DEFAULT_USER: &str = "u1";
const DISCOUNT_PCT: u32 = 10;

#[derive(Debug, Clone)]
struct Code {
    code: String,
    used: bool,
    created_at: &'static str,
}

#[derive(Debug, Default)]
struct ShopState {
    carts: BTreeMap<String, BTreeMap<u64, u32>>,
    codes: Vec<Code>,
    items_purchased: u64,
    gross: Decimal,
    discounts: Decimal,
    orders: u64,
}

/// Server-side state plus the transport that reaches it.
#[derive(Clone)]
pub struct Shop {
    state: Arc<Mutex<ShopState>>,
    pub transport: MockTransport,
}

impl Shop {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(ShopState::default()));
        let transport = MockTransport::responding({
            let state = state.clone();
            move |request| Ok(handle(&mut state.lock(), request))
        });
        Self { state, transport }
    }

    pub fn client(&self, settings: SettingsStore) -> ApiClient {
        ApiClient::new(BASE, settings, Arc::new(self.transport.clone()))
    }

    /// A cache and coordinator for a caller identified by `settings`.
    pub fn connect(&self, settings: SettingsStore) -> (QueryCache, MutationCoordinator) {
        let cache = QueryCache::new(self.client(settings));
        let mutations = MutationCoordinator::new(cache.clone());
        (cache, mutations)
    }

    pub fn quantity(&self, user: &str, product_id: u64) -> u32 {
        self.state
            .lock()
            .carts
            .get(user)
            .and_then(|cart| cart.get(&product_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn seed_cart(&self, user: &str, product_id: u64, quantity: u32) {
        self.state
            .lock()
            .carts
            .entry(user.to_string())
            .or_default()
            .insert(product_id, quantity);
    }

    pub fn requests_to(&self, path: &str) -> usize {
        let url = format!("{BASE}{path}");
        self.transport
            .requests()
            .iter()
            .filter(|request| request.url == url)
            .count()
    }
}

pub fn products() -> Value {
    json!([
        {"id": 1, "name": "Almonds 500g", "price": "750.00"},
        {"id": 5, "name": "Green Tea", "price": "240.00"},
        {"id": 7, "name": "Honey 250g", "price": "320.50"},
    ])
}

fn price(product_id: u64) -> Option<Decimal> {
    products()
        .as_array()?
        .iter()
        .find(|product| product["id"] == product_id)
        .and_then(|product| product["price"].as_str()?.parse().ok())
}

fn detail(status: u16, message: &str) -> RawResponse {
    RawResponse::json(status, &json!({ "detail": message }))
}

fn cart_json(cart: Option<&BTreeMap<u64, u32>>) -> Value {
    let lines: Vec<(u64, u32)> = cart
        .map(|cart| cart.iter().map(|(id, qty)| (*id, *qty)).collect())
        .unwrap_or_default();
    let total: Decimal = lines
        .iter()
        .map(|(id, qty)| price(*id).unwrap_or_default() * Decimal::from(*qty))
        .sum();
    json!({
        "items": lines
            .iter()
            .map(|(id, qty)| json!({"product_id": id, "quantity": qty}))
            .collect::<Vec<_>>(),
        "total": format!("{:.2}", total),
    })
}

fn handle(state: &mut ShopState, request: &PreparedRequest) -> RawResponse {
    let path = request.url.strip_prefix(BASE).unwrap_or(&request.url).to_string();
    let user = request
        .headers
        .get(USER_ID_HEADER)
        .unwrap_or(DEFAULT_USER)
        .to_string();
    let admin = request.headers.get(ADMIN_KEY_HEADER) == Some(ADMIN_KEY);
    let body = request.body.clone().unwrap_or(Value::Null);
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();

    match (request.method, segments.as_slice()) {
        (Method::Get, ["products"]) => RawResponse::json(200, &products()),
        (Method::Get, ["cart"]) => RawResponse::json(200, &cart_json(state.carts.get(&user))),
        (Method::Post, ["cart", "items"]) => {
            let (Some(product_id), Some(quantity)) = (body["product_id"].as_u64(), body["quantity"].as_u64())
            else {
                return RawResponse::json(400, &json!({"quantity": ["This field is required."]}));
            };
            if price(product_id).is_none() {
                return detail(404, "Product not found.");
            }
            if quantity < 1 {
                return RawResponse::json(
                    400,
                    &json!({"quantity": ["Ensure this value is greater than or equal to 1."]}),
                );
            }
            let line = state.carts.entry(user).or_default().entry(product_id).or_insert(0);
            *line += u32::try_from(quantity).unwrap_or(u32::MAX);
            detail(201, "Added")
        }
        (Method::Put, ["cart", "items", id]) => {
            let (Ok(product_id), Some(quantity)) = (id.parse::<u64>(), body["quantity"].as_i64()) else {
                return detail(400, "quantity required");
            };
            let cart = state.carts.entry(user).or_default();
            if quantity <= 0 {
                cart.remove(&product_id);
            } else {
                cart.insert(product_id, u32::try_from(quantity).unwrap_or(u32::MAX));
            }
            RawResponse::json(200, &cart_json(Some(cart)))
        }
        (Method::Delete, ["cart", "items", id]) => {
            if let (Ok(product_id), Some(cart)) = (id.parse::<u64>(), state.carts.get_mut(&user)) {
                cart.remove(&product_id);
            }
            RawResponse::no_content()
        }
        (Method::Post, ["checkout"]) => checkout(state, &user, &body),
        (Method::Get, ["admin", "stats"]) if admin => RawResponse::json(
            200,
            &json!({
                "items_purchased": state.items_purchased,
                "gross_amount": format!("{:.2}", state.gross),
                "total_discount_amount": format!("{:.2}", state.discounts),
                "net_amount": format!("{:.2}", state.gross - state.discounts),
                "discount_codes": state.codes.iter().map(|code| json!({
                    "code": code.code,
                    "discount_pct": DISCOUNT_PCT,
                    "used": code.used,
                    "created_at": code.created_at,
                })).collect::<Vec<_>>(),
            }),
        ),
        (Method::Post, ["admin", "generate-discount"]) if admin => {
            if state.codes.iter().any(|code| !code.used) {
                return detail(400, "An active discount code already exists.");
            }
            let code = Code {
                code: format!("SAVE{}", state.codes.len() + 1),
                used: false,
                created_at: "2025-01-02T03:04:05Z",
            };
            state.codes.push(code.clone());
            RawResponse::json(
                201,
                &json!({
                    "code": code.code,
                    "discount_pct": DISCOUNT_PCT,
                    "created_at": code.created_at,
                }),
            )
        }
        (_, ["admin", ..]) => detail(403, "Invalid admin key."),
        _ => detail(404, "Not found."),
    }
}

fn checkout(state: &mut ShopState, user: &str, body: &Value) -> RawResponse {
    let lines: Vec<(u64, u32)> = state
        .carts
        .get(user)
        .map(|cart| cart.iter().map(|(id, qty)| (*id, *qty)).collect())
        .unwrap_or_default();
    if lines.is_empty() {
        return detail(400, "Cart is empty.");
    }

    let code = body.get("discount_code").and_then(Value::as_str);
    if let Some(code) = code {
        if !state.codes.iter().any(|c| c.code == code && !c.used) {
            return RawResponse::json(400, &json!({"discount_code": ["Invalid or already used code."]}));
        }
    }

    let subtotal: Decimal = lines
        .iter()
        .map(|(id, qty)| price(*id).unwrap_or_default() * Decimal::from(*qty))
        .sum();
    let discount = if code.is_some() {
        (subtotal * Decimal::from(DISCOUNT_PCT) / Decimal::from(100)).round_dp(2)
    } else {
        Decimal::ZERO
    };
    if let Some(code) = code {
        if let Some(entry) = state.codes.iter_mut().find(|c| c.code == code) {
            entry.used = true;
        }
    }

    state.orders += 1;
    state.items_purchased += lines.iter().map(|(_, qty)| u64::from(*qty)).sum::<u64>();
    state.gross += subtotal;
    state.discounts += discount;
    state.carts.remove(user);

    RawResponse::json(
        201,
        &json!({
            "order_id": state.orders,
            "subtotal": format!("{:.2}", subtotal),
            "discount": format!("{:.2}", discount),
            "total": format!("{:.2}", subtotal - discount),
        }),
    )
}

/// Waits up to a second for `check` to hold, yielding between attempts.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition should be reached within a second");
}

/// A settings store for `user`, with no admin key.
pub fn user(user: &str) -> SettingsStore {
    let settings = SettingsStore::in_memory();
    settings.set_user_id(user);
    settings
}
