//! Persisted cart format.
//!
//! The stored value is a JSON array of [`CartLineItem`] objects:
//!
//! ```json
//! [{"id":"p1","title":"Shirt","image_url":"https://...","price":10.0,"quantity":2}]
//! ```
//!
//! [`encode`] and [`decode`] are the only functions that touch this format.

use std::collections::HashMap;

use go_marketplace_core::{CartLineItem, ProductId};
use thiserror::Error;

/// Errors that can occur when converting between a cart and its stored form.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stored value is not a valid cart.
    #[error("invalid stored cart: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a cart for storage.
///
/// # Errors
///
/// Returns `CodecError::Json` if serialization fails.
pub fn encode(items: &[CartLineItem]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(items)?)
}

/// Parse a stored cart and restore its invariants.
///
/// A missing or zero quantity becomes 1. Lines sharing an id are merged into
/// the first occurrence with their quantities summed.
///
/// # Errors
///
/// Returns `CodecError::Json` if the value is not a JSON array of line items.
pub fn decode(value: &str) -> Result<Vec<CartLineItem>, CodecError> {
    let stored: Vec<CartLineItem> = serde_json::from_str(value)?;
    Ok(normalize(stored))
}

fn normalize(stored: Vec<CartLineItem>) -> Vec<CartLineItem> {
    let mut positions: HashMap<ProductId, usize> = HashMap::with_capacity(stored.len());
    let mut items: Vec<CartLineItem> = Vec::with_capacity(stored.len());

    for mut item in stored {
        item.quantity = item.quantity.max(1);

        if let Some(existing) = positions.get(&item.id).and_then(|&pos| items.get_mut(pos)) {
            tracing::debug!(product_id = %item.id, "Merging duplicate stored cart line");
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            continue;
        }

        positions.insert(item.id.clone(), items.len());
        items.push(item);
    }

    items
}
