//! Client-side synchronization of server resources.
//!
//! Reads go through the [`QueryCache`], writes through the
//! [`MutationCoordinator`]. Tags connect the two:
//!
//! - **Queries** declare the tags their entries carry ([`Endpoint::TAGS`])
//! - **Mutations** declare the tags they invalidate ([`Mutation::INVALIDATES`])
//! - **The tag index** finds every entry affected by a successful write
//!
//! # Example
//!
//! ```rust,ignore
//! use shopsync::api::{AddCartItem, CartLine, GetCart};
//! use shopsync::subscription::http::{MutationCoordinator, QueryCache};
//!
//! let cache = QueryCache::new(api);
//! let mutations = MutationCoordinator::new(cache.clone());
//!
//! let _cart = cache.subscribe::<GetCart, _>(&(), |entry| render(entry));
//! cache.read::<GetCart>(&());
//!
//! // The cart entry goes stale and, being subscribed, is refetched.
//! mutations.mutate::<AddCartItem>(CartLine { product_id: 5, quantity: 2 }).await?;
//! ```

mod cache;
mod config;
pub mod mutation;
pub mod query;
pub mod tags;

pub use cache::{CacheEntry, EntryStatus};
pub use config::QueryConfig;
pub use mutation::{Mutation, MutationCoordinator, MutationState};
pub use query::{Endpoint, Query, QueryCache, QueryKey, QuerySubscription};
pub use tags::{Tag, TagIndex};
