//! Browser-side cart state tracking for storefront widgets.
//!
//! A [`CartWatcher`] mirrors the server's cart in `localStorage`, notices when *any* script on the page mutates the
//! cart, re-reads it and publishes the line-level [`CartDiff`] on a [`ChangeBus`].
//! The [`checkout`] and [`subscription`] modules build the selling plan widgets' cart logic on top of it.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod bus;
pub mod checkout;
pub mod config;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod model;
pub mod monitor;
pub mod store;
pub mod subscription;
pub mod watcher;

pub use bus::{ChangeBus, Subscription};
pub use config::WatcherConfig;
pub use diff::{diff, CartDiff};
pub use error::{CartError, CartResult};
pub use model::{CartSnapshot, LineItem};
pub use watcher::CartWatcher;
