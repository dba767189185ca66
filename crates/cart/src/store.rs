//! The cart store.
//!
//! `CartStore` owns the cart's line items and keeps the persisted copy in
//! step with them. It is created through [`CartStore::mount`], which finishes
//! hydrating from storage before handing the store out, so no mutation can be
//! applied to a cart that is still loading.
//!
//! Mutations are serialized: each one holds the store's write lock across
//! read, modify, and the storage write, so writes reach storage in the order
//! the mutations were issued. The write and the publish of the new cart run
//! on a spawned task that owns the lock, so a caller that stops waiting (a
//! timeout, a `select!`) cannot leave memory ahead of storage.

use std::fmt;
use std::sync::Arc;

use go_marketplace_core::{CartLineItem, NewCartItem};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::{Instrument, instrument};

use crate::codec;
use crate::config::CartConfig;
use crate::error::Result;
use crate::storage::{FileStorage, KeyValueStorage, StorageError};

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable view of the cart at one point in time.
///
/// Cloning is cheap. Two snapshots taken without an intervening change share
/// the same allocation, which [`CartSnapshot::ptr_eq`] exposes so renderers
/// can skip work when nothing changed.
#[derive(Clone, Default)]
pub struct CartSnapshot {
    items: Arc<[CartLineItem]>,
}

impl CartSnapshot {
    /// The line items, in the order they were added.
    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    /// Iterate over the line items.
    pub fn iter(&self) -> std::slice::Iter<'_, CartLineItem> {
        self.items.iter()
    }

    /// Number of distinct products in the cart.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the line for a product.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CartLineItem> {
        self.items.iter().find(|item| item.id == *id)
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of line totals, or `None` if it does not fit in a `Decimal`.
    #[must_use]
    pub fn subtotal(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.line_total()?))
    }

    /// Whether both snapshots are the same version of the cart.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl From<Vec<CartLineItem>> for CartSnapshot {
    fn from(items: Vec<CartLineItem>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl PartialEq for CartSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.items == other.items
    }
}

impl Eq for CartSnapshot {}

impl fmt::Debug for CartSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a CartSnapshot {
    type Item = &'a CartLineItem;
    type IntoIter = std::slice::Iter<'a, CartLineItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Shopping cart backed by a key-value store.
///
/// This handle is cheaply cloneable via `Arc`; every clone operates on the
/// same cart.
pub struct CartStore<S> {
    inner: Arc<CartStoreInner<S>>,
}

struct CartStoreInner<S> {
    storage: S,
    key: String,
    /// Held across each read-modify-persist cycle.
    write_lock: Arc<Mutex<()>>,
    /// Current cart; receivers are notified only when it changes.
    changes: watch::Sender<CartSnapshot>,
}

impl<S> Clone for CartStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for CartStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CartStore")
            .field("storage_key", &self.inner.key)
            .field("items", &self.inner.changes.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStorage> CartStore<S> {
    /// Create a store and hydrate it from `storage`.
    ///
    /// Reads `key` once. A missing value starts an empty cart. A value that
    /// cannot be read or parsed is logged and also starts an empty cart, so a
    /// corrupt cart never blocks startup.
    #[instrument(skip(storage, key), fields(storage_key = tracing::field::Empty))]
    pub async fn mount(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        tracing::Span::current().record("storage_key", key.as_str());

        let items = hydrate(&storage, &key).await;
        tracing::debug!(items = items.len(), "Cart hydrated");

        let (changes, _) = watch::channel(CartSnapshot::from(items));
        Self {
            inner: Arc::new(CartStoreInner {
                storage,
                key,
                write_lock: Arc::new(Mutex::new(())),
                changes,
            }),
        }
    }

    /// Create a store using the configured storage key.
    pub async fn mount_with_config(storage: S, config: &CartConfig) -> Self {
        Self::mount(storage, config.storage_key.clone()).await
    }

    /// The key the cart is persisted under.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.inner.key
    }

    /// The current cart.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.changes.borrow().clone()
    }

    /// Subscribe to cart changes.
    ///
    /// The receiver starts at the current cart and is woken each time the
    /// cart's contents change. Operations that change nothing do not notify.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.inner.changes.subscribe()
    }

    /// Add a product to the cart.
    ///
    /// If the product is already in the cart its quantity goes up by one.
    /// Otherwise it is appended with its own quantity, or 1 if none was given.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the cart could not be persisted. The
    /// in-memory cart still reflects the addition.
    #[instrument(skip(self, item), fields(product_id = %item.id))]
    pub async fn add_to_cart(&self, item: NewCartItem) -> Result<CartSnapshot> {
        self.mutate(move |items| {
            if let Some(existing) = items.iter_mut().find(|line| line.id == item.id) {
                let Some(quantity) = existing.quantity.checked_add(1) else {
                    tracing::debug!("Quantity already at maximum");
                    return false;
                };
                existing.quantity = quantity;
                tracing::debug!(quantity, "Incremented existing line");
            } else {
                let line = item.into_line_item();
                tracing::debug!(quantity = line.quantity, "Appended new line");
                items.push(line);
            }
            true
        })
        .await
    }

    /// Increase a product's quantity by one.
    ///
    /// Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the cart could not be persisted.
    #[instrument(skip(self))]
    pub async fn increment(&self, id: &str) -> Result<CartSnapshot> {
        self.mutate(|items| {
            let Some(line) = items.iter_mut().find(|line| line.id == *id) else {
                tracing::debug!("Product not in cart");
                return false;
            };
            let Some(quantity) = line.quantity.checked_add(1) else {
                tracing::debug!("Quantity already at maximum");
                return false;
            };
            line.quantity = quantity;
            true
        })
        .await
    }

    /// Decrease a product's quantity by one.
    ///
    /// Quantities stop at 1; use [`CartStore::remove`] to drop a line.
    /// Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the cart could not be persisted.
    #[instrument(skip(self))]
    pub async fn decrement(&self, id: &str) -> Result<CartSnapshot> {
        self.mutate(|items| {
            let Some(line) = items.iter_mut().find(|line| line.id == *id) else {
                tracing::debug!("Product not in cart");
                return false;
            };
            if line.quantity <= 1 {
                tracing::debug!("Quantity already at minimum");
                return false;
            }
            line.quantity -= 1;
            true
        })
        .await
    }

    /// Remove a product's line from the cart.
    ///
    /// Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the cart could not be persisted.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<CartSnapshot> {
        self.mutate(|items| {
            let before = items.len();
            items.retain(|line| line.id != *id);
            items.len() != before
        })
        .await
    }

    /// Empty the cart and delete its persisted copy.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the persisted copy could not be
    /// deleted. The in-memory cart is empty regardless.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<CartSnapshot> {
        let guard = Arc::clone(&self.inner.write_lock).lock_owned().await;

        let current = self.snapshot();
        let snapshot = if current.is_empty() {
            current
        } else {
            CartSnapshot::default()
        };

        self.commit(guard, snapshot, None).await
    }

    /// Apply `change` to a copy of the cart, persist it, and publish it.
    ///
    /// `change` returns whether it modified the items; when it did not, the
    /// current snapshot is returned and nothing is written.
    async fn mutate<F>(&self, change: F) -> Result<CartSnapshot>
    where
        F: FnOnce(&mut Vec<CartLineItem>) -> bool,
    {
        let guard = Arc::clone(&self.inner.write_lock).lock_owned().await;

        let current = self.snapshot();
        let mut items = current.items().to_vec();
        if !change(&mut items) {
            return Ok(current);
        }

        let encoded = codec::encode(&items)?;
        self.commit(guard, CartSnapshot::from(items), Some(encoded))
            .await
    }

    /// Write `encoded` (or delete the key when `None`), then publish
    /// `snapshot`.
    ///
    /// Runs on its own task holding `guard`, so it completes and releases the
    /// lock even if the caller is dropped mid-write. A failed write still
    /// publishes the snapshot; the divergence is logged and returned.
    async fn commit(
        &self,
        guard: OwnedMutexGuard<()>,
        snapshot: CartSnapshot,
        encoded: Option<String>,
    ) -> Result<CartSnapshot> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                let written = match encoded {
                    Some(value) => inner.storage.set_item(&inner.key, value).await,
                    None => inner.storage.remove_item(&inner.key).await,
                };

                if !snapshot.ptr_eq(&inner.changes.borrow()) {
                    inner.changes.send_replace(snapshot.clone());
                }

                if let Err(e) = &written {
                    tracing::warn!(
                        error = %e,
                        items = snapshot.len(),
                        "Failed to persist cart; in-memory cart is ahead of storage"
                    );
                }
                written.map(|()| snapshot)
            }
            .in_current_span(),
        );

        let written = task
            .await
            .map_err(|e| StorageError::Unavailable(format!("persist task failed: {e}")))?;
        written.map_err(Into::into)
    }
}

impl CartStore<FileStorage> {
    /// Open the file-backed cart described by environment variables.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Config` if the configuration is invalid.
    pub async fn from_env() -> Result<Self> {
        let config = CartConfig::from_env()?;
        Ok(Self::open(&config).await)
    }

    /// Open the file-backed cart described by `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Config` if the configuration is invalid.
    pub async fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = CartConfig::from_lookup(lookup)?;
        Ok(Self::open(&config).await)
    }

    async fn open(config: &CartConfig) -> Self {
        let storage = FileStorage::from_config(config);
        tracing::info!(dir = %storage.dir().display(), "Opening file-backed cart");
        Self::mount_with_config(storage, config).await
    }
}

/// Load the persisted cart, falling back to an empty one.
async fn hydrate<S: KeyValueStorage>(storage: &S, key: &str) -> Vec<CartLineItem> {
    match storage.get_item(key).await {
        Ok(Some(value)) => codec::decode(&value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable persisted cart");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read persisted cart");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use go_marketplace_core::{Price, ProductId};

    use super::*;
    use crate::error::CartError;
    use crate::storage::MemoryStorage;

    const KEY: &str = "@GoMarketplace:products";

    fn product(id: &str) -> NewCartItem {
        NewCartItem::new(
            ProductId::parse(id).unwrap(),
            format!("Product {id}"),
            format!("https://cdn.example.com/{id}.png"),
            Price::from_cents(1000).unwrap(),
        )
    }

    async fn persisted(storage: &MemoryStorage) -> Vec<CartLineItem> {
        let value = storage.get_item(KEY).await.unwrap().unwrap();
        codec::decode(&value).unwrap()
    }

    /// Storage whose writes can be switched off.
    #[derive(Clone, Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_writes: Arc<AtomicBool>,
    }

    impl KeyValueStorage for FlakyStorage {
        async fn get_item(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.inner.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: String) -> std::result::Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("disk full".to_string()));
            }
            self.inner.set_item(key, value).await
        }

        async fn remove_item(&self, key: &str) -> std::result::Result<(), StorageError> {
            self.inner.remove_item(key).await
        }
    }

    /// Storage whose writes take 200ms.
    #[derive(Clone, Default)]
    struct SlowStorage {
        inner: MemoryStorage,
    }

    impl KeyValueStorage for SlowStorage {
        async fn get_item(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.inner.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: String) -> std::result::Result<(), StorageError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.inner.set_item(key, value).await
        }

        async fn remove_item(&self, key: &str) -> std::result::Result<(), StorageError> {
            self.inner.remove_item(key).await
        }
    }

    /// Storage whose reads always fail.
    struct UnreadableStorage;

    impl KeyValueStorage for UnreadableStorage {
        async fn get_item(&self, _key: &str) -> std::result::Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("locked".to_string()))
        }

        async fn set_item(&self, _key: &str, _value: String) -> std::result::Result<(), StorageError> {
            Ok(())
        }

        async fn remove_item(&self, _key: &str) -> std::result::Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mount_empty_storage() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;
        assert!(store.snapshot().is_empty());
        assert_eq!(store.storage_key(), KEY);
    }

    #[tokio::test]
    async fn test_mount_corrupt_storage_starts_empty() {
        let storage = MemoryStorage::with_item(KEY, "{not a cart");
        let store = CartStore::mount(storage, KEY).await;
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_mount_unreadable_storage_starts_empty() {
        let store = CartStore::mount(UnreadableStorage, KEY).await;
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_add_distinct_products() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;

        for id in ["a", "b", "c"] {
            store.add_to_cart(product(id)).await.unwrap();
        }
        store.add_to_cart(product("b")).await.unwrap();
        let cart = store.add_to_cart(product("c")).await.unwrap();
        store.add_to_cart(product("c")).await.unwrap();
        let cart_after = store.snapshot();

        assert_eq!(cart.len(), 3);
        assert_eq!(cart_after.get("a").unwrap().quantity, 1);
        assert_eq!(cart_after.get("b").unwrap().quantity, 2);
        assert_eq!(cart_after.get("c").unwrap().quantity, 3);
        assert_eq!(persisted(&storage).await, cart_after.items());
    }

    #[tokio::test]
    async fn test_add_same_product_twice_single_line() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;

        store.add_to_cart(product("p1")).await.unwrap();
        let cart = store.add_to_cart(product("p1")).await.unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get("p1").unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_add_existing_ignores_given_quantity() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;

        store.add_to_cart(product("p1").with_quantity(3)).await.unwrap();
        let cart = store.add_to_cart(product("p1").with_quantity(10)).await.unwrap();

        assert_eq!(cart.get("p1").unwrap().quantity, 4);
    }

    #[tokio::test]
    async fn test_increment_absent_is_noop() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;
        let before = store.snapshot();

        let after = store.increment("ghost").await.unwrap();

        assert!(after.is_empty());
        assert!(after.ptr_eq(&before));
        assert_eq!(storage.get_item(KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_persists() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;
        store.add_to_cart(product("p1")).await.unwrap();

        let cart = store.increment("p1").await.unwrap();

        assert_eq!(cart.get("p1").unwrap().quantity, 2);
        assert_eq!(persisted(&storage).await.first().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_decrement_clamps_at_one() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;
        let added = store.add_to_cart(product("p1")).await.unwrap();

        let cart = store.decrement("p1").await.unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get("p1").unwrap().quantity, 1);
        assert!(cart.ptr_eq(&added));
        assert_eq!(persisted(&storage).await.first().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_decrement_persists() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;
        store.add_to_cart(product("p1").with_quantity(3)).await.unwrap();

        let cart = store.decrement("p1").await.unwrap();

        assert_eq!(cart.get("p1").unwrap().quantity, 2);
        assert_eq!(persisted(&storage).await.first().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_decrement_absent_is_noop() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;
        store.add_to_cart(product("p1")).await.unwrap();

        let cart = store.decrement("p2").await.unwrap();

        assert_eq!(cart.len(), 1);
        assert!(cart.get("p2").is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;
        store.add_to_cart(product("p1")).await.unwrap();
        store.add_to_cart(product("p2")).await.unwrap();

        let cart = store.remove("p1").await.unwrap();

        assert_eq!(cart.len(), 1);
        assert!(cart.get("p1").is_none());
        assert_eq!(persisted(&storage).await.len(), 1);

        let unchanged = store.remove("p1").await.unwrap();
        assert!(unchanged.ptr_eq(&cart));
    }

    #[tokio::test]
    async fn test_clear_deletes_persisted_copy() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;
        store.add_to_cart(product("p1")).await.unwrap();

        let cart = store.clear().await.unwrap();

        assert!(cart.is_empty());
        assert_eq!(storage.get_item(KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_totals() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;
        store.add_to_cart(product("p1").with_quantity(2)).await.unwrap();
        let cart = store.add_to_cart(product("p2")).await.unwrap();

        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.subtotal(), Some(Decimal::new(3000, 2)));
    }

    #[tokio::test]
    async fn test_subtotal_overflow_is_none() {
        let stored = r#"[{"id":"p1","title":"Gold","image_url":"","price":50000000000000000000000000000,"quantity":2}]"#;
        let store = CartStore::mount(MemoryStorage::with_item(KEY, stored), KEY).await;

        let cart = store.snapshot();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.subtotal(), None);
        assert_eq!(cart.total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_mount_keeps_valid_lines_next_to_null_quantity() {
        let stored = r#"[
            {"id":"p1","title":"Shirt","image_url":"","price":10,"quantity":null},
            {"id":"p2","title":"Hat","image_url":"","price":5,"quantity":3},
            {"id":"p3","title":"Mug","image_url":"","price":7,"quantity":-2}
        ]"#;
        let store = CartStore::mount(MemoryStorage::with_item(KEY, stored), KEY).await;

        let cart = store.snapshot();
        assert_eq!(cart.len(), 3);
        assert_eq!(cart.get("p1").unwrap().quantity, 1);
        assert_eq!(cart.get("p2").unwrap().quantity, 3);
        assert_eq!(cart.get("p3").unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_increment_at_max_quantity_is_noop() {
        let stored = format!(
            r#"[{{"id":"p1","title":"Shirt","image_url":"","price":1,"quantity":{}}}]"#,
            u32::MAX
        );
        let storage = MemoryStorage::with_item(KEY, stored.clone());
        let store = CartStore::mount(storage.clone(), KEY).await;
        let before = store.snapshot();

        let after_increment = store.increment("p1").await.unwrap();
        let after_add = store.add_to_cart(product("p1")).await.unwrap();

        assert!(after_increment.ptr_eq(&before));
        assert!(after_add.ptr_eq(&before));
        assert_eq!(after_add.get("p1").unwrap().quantity, u32::MAX);
        assert_eq!(storage.get_item(KEY).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_abandoned_mutation_still_persists() {
        let storage = SlowStorage::default();
        let store = CartStore::mount(storage.clone(), KEY).await;

        let result =
            tokio::time::timeout(Duration::from_millis(10), store.add_to_cart(product("p1"))).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(store.snapshot().len(), 1);
        let stored = storage.inner.get_item(KEY).await.unwrap().unwrap();
        assert_eq!(codec::decode(&stored).unwrap(), store.snapshot().items());
    }

    #[tokio::test]
    async fn test_publishes_only_after_write() {
        let storage = SlowStorage::default();
        let store = CartStore::mount(storage.clone(), KEY).await;

        let writer = store.clone();
        let pending = tokio::spawn(async move { writer.add_to_cart(product("p1")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.snapshot().is_empty());
        pending.await.unwrap().unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_from_lookup_opens_file_cart() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_str().unwrap().to_string();
        let lookup = move |key: &str| (key == "CART_STORAGE_DIR").then(|| dir_path.clone());

        let store = CartStore::<FileStorage>::from_lookup(lookup.clone()).await.unwrap();
        store.add_to_cart(product("p1")).await.unwrap();

        let reopened = CartStore::<FileStorage>::from_lookup(lookup).await.unwrap();
        assert_eq!(reopened.snapshot().get("p1").unwrap().quantity, 1);
        assert!(FileStorage::new(dir.path()).path_for(KEY).exists());
    }

    #[tokio::test]
    async fn test_from_lookup_invalid_config() {
        let result = CartStore::<FileStorage>::from_lookup(|key: &str| {
            (key == "CART_STORAGE_KEY").then(|| " ".to_string())
        })
        .await;
        assert!(matches!(result, Err(CartError::Config(_))));
    }

    #[tokio::test]
    async fn test_subscribers_notified_only_on_change() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.increment("ghost").await.unwrap();
        assert!(!rx.has_changed().unwrap());

        store.add_to_cart(product("p1")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        store.decrement("p1").await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_cart() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;
        let other = store.clone();

        store.add_to_cart(product("p1")).await.unwrap();
        other.increment("p1").await.unwrap();

        assert_eq!(store.snapshot().get("p1").unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let storage = MemoryStorage::new();
        let store = CartStore::mount(storage.clone(), KEY).await;

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.add_to_cart(product("p1")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.snapshot().get("p1").unwrap().quantity, 20);
        assert_eq!(persisted(&storage).await.first().unwrap().quantity, 20);
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_error_and_keeps_memory() {
        let storage = FlakyStorage::default();
        let store = CartStore::mount(storage.clone(), KEY).await;
        store.add_to_cart(product("p1")).await.unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        let result = store.increment("p1").await;

        assert!(matches!(result, Err(CartError::Storage(_))));
        assert_eq!(store.snapshot().get("p1").unwrap().quantity, 2);

        let stored = storage.inner.get_item(KEY).await.unwrap().unwrap();
        assert_eq!(codec::decode(&stored).unwrap().first().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_snapshot_identity_stable_without_changes() {
        let store = CartStore::mount(MemoryStorage::new(), KEY).await;
        store.add_to_cart(product("p1")).await.unwrap();

        let a = store.snapshot();
        let b = store.snapshot();
        assert!(a.ptr_eq(&b));

        store.increment("p1").await.unwrap();
        assert!(!a.ptr_eq(&store.snapshot()));
    }
}
