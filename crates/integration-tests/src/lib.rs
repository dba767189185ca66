//! Integration tests for Go Marketplace.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p go-marketplace-integration-tests
//! ```
//!
//! Set `RUST_LOG=go_marketplace_cart=debug` to see the store's tracing output.
//!
//! # Test Categories
//!
//! - `cart_store` - End-to-end cart scenarios over file-backed storage

use std::sync::Once;

use go_marketplace_cart::{CartConfig, CartStore, FileStorage};
use go_marketplace_core::{CartLineItem, NewCartItem, Price, ProductId};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A temporary storage directory plus the config pointing at it.
///
/// The directory is deleted when the context is dropped.
pub struct TestContext {
    pub dir: TempDir,
    pub config: CartConfig,
}

impl TestContext {
    /// Create a context with a fresh storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let config = CartConfig {
            storage_dir: dir.path().to_path_buf(),
            ..CartConfig::default()
        };
        Ok(Self { dir, config })
    }

    /// File storage over the context's directory.
    #[must_use]
    pub fn storage(&self) -> FileStorage {
        FileStorage::from_config(&self.config)
    }

    /// Mount a store over the context's storage, as an app start would.
    pub async fn mount(&self) -> CartStore<FileStorage> {
        CartStore::mount_with_config(self.storage(), &self.config).await
    }

    /// Read the raw persisted value, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_persisted(&self) -> std::io::Result<Option<String>> {
        let path = self.storage().path_for(&self.config.storage_key);
        match std::fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a raw persisted value, as a previous app run would have.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_persisted(&self, value: &str) -> std::io::Result<()> {
        let path = self.storage().path_for(&self.config.storage_key);
        std::fs::write(path, value)
    }
}

/// A product with the given id and price in cents.
///
/// # Panics
///
/// Panics if `id` is blank or `cents` is negative.
#[must_use]
pub fn product(id: &str, title: &str, cents: i64) -> NewCartItem {
    NewCartItem::new(
        ProductId::parse(id).expect("valid product id"),
        title,
        format!("https://cdn.example.com/{id}.png"),
        Price::from_cents(cents).expect("non-negative price"),
    )
}

/// A cart line with the given quantity.
#[must_use]
pub fn line(id: &str, title: &str, cents: i64, quantity: u32) -> CartLineItem {
    CartLineItem {
        quantity,
        ..product(id, title, cents).into_line_item()
    }
}
