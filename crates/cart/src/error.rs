//! Cart error types.
//!
//! Every fallible cart operation returns `Result<T, CartError>`. Storage read
//! failures during hydration never reach the caller (the cart starts empty);
//! write failures do, so the caller knows memory and storage have diverged.

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors returned by the cart store and its provider.
#[derive(Debug, Error)]
pub enum CartError {
    /// The cart was requested from a provider with nothing mounted.
    #[error("use_cart must be used within a CartProvider")]
    OutsideProvider,

    /// The storage backend failed to persist the cart.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The cart could not be encoded for storage.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Cart configuration is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;
