//! Go Marketplace Core - Shared cart types.
//!
//! This crate provides the types shared by the cart store and any UI layer
//! that renders it:
//! - `cart` - The persisted cart store (storage backends, hydration, mutators)
//! - `integration-tests` - End-to-end cart scenarios
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no storage
//! access. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Validated product IDs, prices, and cart line items

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
