//! Common imports for building on shopsync.
//!
//! ```
//! use shopsync::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Application`], [`Command`], [`Action`], [`Subscription`], [`Runtime`] - the terminal runtime
//! - [`QueryCache`], [`MutationCoordinator`], [`Tag`] - server state
//! - [`ApiClient`], [`ApiError`], [`SettingsStore`] - requests and identity

pub use crate::api::ApiClient;
pub use crate::application::Application;
pub use crate::command::{Action, Command};
pub use crate::error::ApiError;
pub use crate::runtime::Runtime;
pub use crate::settings::SettingsStore;
pub use crate::subscription::Subscription;
pub use crate::subscription::http::{MutationCoordinator, QueryCache, Tag};
