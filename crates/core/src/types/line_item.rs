//! Cart line items.

use core::fmt;

use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Price, ProductId};

/// One product entry in the cart.
///
/// This is also the persisted record: a cart is stored as a JSON array of
/// these, with snake_case field names (`image_url`, not `imageUrl`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub id: ProductId,
    pub title: String,
    pub image_url: String,
    pub price: Price,
    /// Always at least 1 once the item is in a cart. A missing, `null`,
    /// negative, or fractional value in stored data deserializes as 0 and is
    /// normalized on hydration.
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

/// Read a stored quantity, mapping anything that is not a whole number in
/// `0..=u32::MAX` to 0. Whole numbers above the range saturate.
fn lenient_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    deserializer.deserialize_any(QuantityVisitor)
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = u32;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a quantity")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
        Ok(u32::try_from(v).unwrap_or(u32::MAX))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
        Ok(u64::try_from(v).map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX)))
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::float_cmp
    )]
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u32, E> {
        if !v.is_finite() || v < 0.0 || v.trunc() != v {
            return Ok(0);
        }
        if v >= f64::from(u32::MAX) {
            return Ok(u32::MAX);
        }
        Ok(v as u32)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<u32, E> {
        Ok(0)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<u32, E> {
        Ok(0)
    }

    fn visit_unit<E: de::Error>(self) -> Result<u32, E> {
        Ok(0)
    }

    fn visit_none<E: de::Error>(self) -> Result<u32, E> {
        Ok(0)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<u32, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl CartLineItem {
    /// Price of the whole line (unit price times quantity), or `None` if it
    /// does not fit in a `Decimal`.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.times(self.quantity)
    }
}

/// A product being added to the cart.
///
/// `quantity` is optional; a new line starts at 1 when it is unset or zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCartItem {
    pub id: ProductId,
    pub title: String,
    pub image_url: String,
    pub price: Price,
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl NewCartItem {
    /// Create a new item with no explicit quantity.
    #[must_use]
    pub fn new(
        id: ProductId,
        title: impl Into<String>,
        image_url: impl Into<String>,
        price: Price,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            image_url: image_url.into(),
            price,
            quantity: None,
        }
    }

    /// Set the starting quantity for the line.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Convert into a cart line, defaulting the quantity to 1.
    #[must_use]
    pub fn into_line_item(self) -> CartLineItem {
        CartLineItem {
            id: self.id,
            title: self.title,
            image_url: self.image_url,
            price: self.price,
            quantity: self.quantity.unwrap_or(1).max(1),
        }
    }
}
