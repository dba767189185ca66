//! Go Marketplace Cart - Persisted shopping cart store.
//!
//! The cart is an ordered list of [`CartLineItem`]s held in memory and
//! mirrored to a key-value store under a single key after every change.
//!
//! # Architecture
//!
//! - [`storage`] - `KeyValueStorage` trait with in-memory and file backends
//! - [`codec`] - The one serialize/deserialize pair for the persisted value
//! - [`store`] - `CartStore`: hydration, mutators, snapshots, change feed
//! - [`provider`] - `CartProvider`: the mounted scope that hands out the store
//! - [`config`] - Storage key and directory from environment variables
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! use go_marketplace_cart::{CartStore, MemoryStorage};
//! use go_marketplace_core::{NewCartItem, Price, ProductId};
//!
//! let store = CartStore::mount(MemoryStorage::new(), "@GoMarketplace:products").await;
//! let item = NewCartItem::new(
//!     ProductId::parse("p1")?,
//!     "Shirt",
//!     "https://cdn.example.com/shirt.png",
//!     Price::from_cents(1000)?,
//! );
//!
//! store.add_to_cart(item.clone()).await?;
//! let cart = store.add_to_cart(item).await?;
//! assert_eq!(cart.len(), 1);
//! assert_eq!(cart.total_quantity(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod codec;
pub mod config;
pub mod error;
pub mod provider;
pub mod storage;
pub mod store;

pub use config::{CartConfig, ConfigError};
pub use error::{CartError, Result};
pub use go_marketplace_core::{CartLineItem, NewCartItem, Price, ProductId};
pub use provider::CartProvider;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use store::{CartSnapshot, CartStore};
