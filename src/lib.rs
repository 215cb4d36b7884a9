//! # shopsync - client-side sync for a small shopping API
//!
//! shopsync keeps a terminal storefront in step with a shopping REST API.
//! Server resources (products, the caller's cart, admin stats) are read
//! through a tag-invalidated query cache; writes go through a mutation
//! coordinator that marks the affected entries stale, and subscribed
//! entries are refetched automatically.
//!
//! ## Layers
//!
//! - [`settings`]: the caller's identity (`userId`, `adminKey`), persisted
//! - [`credentials`] and [`api`]: request construction, with identity headers
//!   captured at dispatch time
//! - [`subscription::http`]: the query cache, tag index and mutation coordinator
//! - [`application`], [`command`], [`subscription`], [`runtime`]: an Elm-style
//!   terminal runtime on top of [ratatui](https://ratatui.rs/)
//! - [`storefront`]: the terminal storefront itself
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use shopsync::api::{AddCartItem, ApiClient, CartLine, GetCart};
//! use shopsync::settings::SettingsStore;
//! use shopsync::subscription::http::{MutationCoordinator, QueryCache};
//! use shopsync::transport::ReqwestTransport;
//!
//! # async fn demo() -> Result<(), shopsync::error::ApiError> {
//! let transport = ReqwestTransport::new(std::time::Duration::from_secs(30))?;
//! let api = ApiClient::new("http://127.0.0.1:8000/api/", SettingsStore::in_memory(), Arc::new(transport));
//! let cache = QueryCache::new(api);
//! let mutations = MutationCoordinator::new(cache.clone());
//!
//! let cart = cache.fetch::<GetCart>(&()).await?;
//! println!("{} lines", cart.items.len());
//!
//! // Marks the cart entry stale.
//! mutations.mutate::<AddCartItem>(CartLine { product_id: 5, quantity: 2 }).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod application;
pub mod command;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod mock;
pub mod model;
pub mod prelude;
pub mod runtime;
pub mod settings;
pub mod storefront;
pub mod subscription;
pub mod transport;
