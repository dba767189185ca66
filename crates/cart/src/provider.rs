//! Cart provider scope.
//!
//! A `CartProvider` is the explicit owner of one cart per application or
//! session. The UI layer holds the provider and asks it for the store with
//! [`CartProvider::use_cart`]; asking before anything is mounted, or after
//! unmounting, is a programming error reported as
//! [`CartError::OutsideProvider`].

use crate::config::CartConfig;
use crate::error::{CartError, Result};
use crate::storage::KeyValueStorage;
use crate::store::CartStore;

/// Scope that owns at most one mounted [`CartStore`].
#[derive(Debug)]
pub struct CartProvider<S> {
    store: Option<CartStore<S>>,
}

impl<S> Default for CartProvider<S> {
    fn default() -> Self {
        Self { store: None }
    }
}

impl<S: KeyValueStorage> CartProvider<S> {
    /// Create a provider with nothing mounted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate a cart from `storage` and make it available to consumers.
    ///
    /// Mounting again replaces the previous store; handles already given out
    /// keep working on the old one.
    pub async fn mount(&mut self, storage: S, key: impl Into<String>) -> CartStore<S> {
        let store = CartStore::mount(storage, key).await;
        self.store = Some(store.clone());
        store
    }

    /// Mount using the configured storage key.
    pub async fn mount_with_config(&mut self, storage: S, config: &CartConfig) -> CartStore<S> {
        self.mount(storage, config.storage_key.clone()).await
    }

    /// Drop the in-memory cart. The persisted copy is left in place.
    pub fn unmount(&mut self) {
        if self.store.take().is_some() {
            tracing::debug!("Cart unmounted");
        }
    }

    /// Whether a cart is mounted.
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.store.is_some()
    }

    /// Get the mounted cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OutsideProvider` if no cart is mounted.
    pub fn use_cart(&self) -> Result<CartStore<S>> {
        self.store.clone().ok_or(CartError::OutsideProvider)
    }
}
