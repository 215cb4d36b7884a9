//! The shop's REST boundary.
//!
//! [`ApiClient`] joins the base URL, the credential provider and a transport.
//! The marker types below describe every endpoint the client uses:
//!
//! | Type | Request | Tags |
//! |---|---|---|
//! | [`ListProducts`] | `GET products/` | provides `Products` |
//! | [`GetCart`] | `GET cart/` | provides `Cart` |
//! | [`AdminStats`] | `GET admin/stats/` | provides `Stats` |
//! | [`AddCartItem`] | `POST cart/items/` | invalidates `Cart` |
//! | [`SetCartItem`] | `PUT cart/items/{id}/` | invalidates `Cart` |
//! | [`RemoveCartItem`] | `DELETE cart/items/{id}/` | invalidates `Cart` |
//! | [`Checkout`] | `POST checkout/` | invalidates `Cart`, `Stats` |
//! | [`GenerateDiscount`] | `POST admin/generate-discount/` | invalidates `Stats` |

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::trace;

use crate::credentials::CredentialProvider;
use crate::error::{ApiError, HttpError};
use crate::model::{Cart, GeneratedDiscount, Product, Stats};
use crate::settings::SettingsStore;
use crate::subscription::http::{Endpoint, Mutation, Tag};
use crate::transport::{ApiRequest, PreparedRequest, RawResponse, Transport};

struct ClientInner {
    base: String,
    credentials: CredentialProvider,
    transport: Arc<dyn Transport>,
}

/// Sends requests to the shop API with the caller's current credentials.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.inner.base)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client rooted at `base`. A trailing slash is added if missing.
    pub fn new(base: impl AsRef<str>, settings: SettingsStore, transport: Arc<dyn Transport>) -> Self {
        let mut base = base.as_ref().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            inner: Arc::new(ClientInner {
                base,
                credentials: CredentialProvider::new(settings),
                transport,
            }),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.inner.base
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsStore {
        self.inner.credentials.settings()
    }

    /// Resolves `request` and attaches the credentials current right now.
    #[must_use]
    pub fn prepare(&self, request: &ApiRequest) -> PreparedRequest {
        self.inner.credentials.prepare(&self.inner.base, request)
    }

    /// Sends a prepared request and interprets the response.
    ///
    /// The transport is invoked before this returns; the future only waits
    /// for the answer.
    pub fn send(&self, request: PreparedRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
        let method = request.method;
        let url = request.url.clone();
        let response = self.inner.transport.execute(request);
        async move {
            let response = response.await?;
            trace!(%method, %url, status = response.status, bytes = response.body.len(), "response");
            interpret(response)
        }
        .boxed()
    }
}

/// Classifies a raw response.
///
/// Non-2xx statuses become [`ApiError::Http`] with the server's detail. An
/// empty 2xx body decodes as `null`.
///
/// # Errors
///
/// Returns [`ApiError::Http`] for non-2xx and [`ApiError::Decode`] for a
/// 2xx body that is not JSON.
pub fn interpret(response: RawResponse) -> Result<Value, ApiError> {
    if !response.is_success() {
        return Err(HttpError::from_body(response.status, &response.body).into());
    }
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// The product catalog.
#[derive(Debug)]
pub struct ListProducts;

impl Endpoint for ListProducts {
    type Arg = ();
    type Output = Vec<Product>;
    const NAME: &'static str = "products";
    const TAGS: &'static [Tag] = &[Tag::Products];

    fn request(_: &()) -> ApiRequest {
        ApiRequest::get("products/")
    }
}

/// The caller's cart, identified by the `X-User-Id` header.
#[derive(Debug)]
pub struct GetCart;

impl Endpoint for GetCart {
    type Arg = ();
    type Output = Cart;
    const NAME: &'static str = "cart";
    const TAGS: &'static [Tag] = &[Tag::Cart];

    fn request(_: &()) -> ApiRequest {
        ApiRequest::get("cart/")
    }
}

/// Aggregate sales figures. Requires the admin key.
#[derive(Debug)]
pub struct AdminStats;

impl Endpoint for AdminStats {
    type Arg = ();
    type Output = Stats;
    const NAME: &'static str = "adminStats";
    const TAGS: &'static [Tag] = &[Tag::Stats];

    fn request(_: &()) -> ApiRequest {
        ApiRequest::get("admin/stats/")
    }
}

/// A product and quantity, as sent to the cart endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: u64,
    pub quantity: u32,
}

/// Adds `quantity` units to the cart, incrementing an existing line.
#[derive(Debug)]
pub struct AddCartItem;

impl Mutation for AddCartItem {
    type Input = CartLine;
    type Output = ();
    const NAME: &'static str = "addCart";
    const INVALIDATES: &'static [Tag] = &[Tag::Cart];

    fn request(line: &CartLine) -> ApiRequest {
        ApiRequest::post("cart/items/").with_body(json!({
            "product_id": line.product_id,
            "quantity": line.quantity,
        }))
    }

    fn decode(_: Value) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Sets the exact quantity of a line. The server removes the line at zero.
#[derive(Debug)]
pub struct SetCartItem;

impl Mutation for SetCartItem {
    type Input = CartLine;
    type Output = ();
    const NAME: &'static str = "setCartItem";
    const INVALIDATES: &'static [Tag] = &[Tag::Cart];

    fn request(line: &CartLine) -> ApiRequest {
        ApiRequest::put(format!("cart/items/{}/", line.product_id))
            .with_body(json!({ "quantity": line.quantity }))
    }

    fn decode(_: Value) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Removes a product's line from the cart.
#[derive(Debug)]
pub struct RemoveCartItem;

impl Mutation for RemoveCartItem {
    type Input = u64;
    type Output = ();
    const NAME: &'static str = "removeCartItem";
    const INVALIDATES: &'static [Tag] = &[Tag::Cart];

    fn request(product_id: &u64) -> ApiRequest {
        ApiRequest::delete(format!("cart/items/{product_id}/"))
    }

    fn decode(_: Value) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Places an order for the cart contents.
///
/// The input is the optional discount code. An absent or empty code is left
/// out of the body entirely. The output is the server's order receipt.
#[derive(Debug)]
pub struct Checkout;

impl Mutation for Checkout {
    type Input = Option<String>;
    type Output = Value;
    const NAME: &'static str = "checkout";
    const INVALIDATES: &'static [Tag] = &[Tag::Cart, Tag::Stats];

    fn request(discount_code: &Option<String>) -> ApiRequest {
        let body = match discount_code.as_deref() {
            Some(code) if !code.is_empty() => json!({ "discount_code": code }),
            _ => json!({}),
        };
        ApiRequest::post("checkout/").with_body(body)
    }

    fn decode(body: Value) -> Result<Value, ApiError> {
        Ok(body)
    }
}

/// Asks the server to issue a discount code. Requires the admin key.
#[derive(Debug)]
pub struct GenerateDiscount;

impl Mutation for GenerateDiscount {
    type Input = ();
    type Output = GeneratedDiscount;
    const NAME: &'static str = "adminGenerate";
    const INVALIDATES: &'static [Tag] = &[Tag::Stats];

    fn request(_: &()) -> ApiRequest {
        ApiRequest::post("admin/generate-discount/")
    }

    fn decode(body: Value) -> Result<GeneratedDiscount, ApiError> {
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
