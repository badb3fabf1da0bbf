//! Client-side cart persistence.
//!
//! A [`CartStore`] owns one shopper's cart. Every mutation is written to local
//! storage immediately, and a [`DebouncedMirror`] pushes the price id and
//! quantity pairs to the server's cart cookie once edits settle.

pub mod mirror;
pub mod storage;
pub mod store;

use thiserror::Error;

pub use mirror::{CartMirror, DebouncedMirror, HttpCartMirror, MIRROR_DEBOUNCE};
pub use storage::{FileCartStorage, LocalCartStorage, MemoryCartStorage, CART_STORAGE_KEY};
pub use store::{CartEntry, CartStore};

#[derive(Debug, Error)]
pub enum CartSyncError {
    #[error("local cart storage failed: {0}")]
    Storage(String),

    #[error("cart mirror request failed: {0}")]
    Mirror(String),

    #[error("cart encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
