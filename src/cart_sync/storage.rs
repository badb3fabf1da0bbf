use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::Mutex,
};

use super::{CartEntry, CartSyncError};

/// Storage key the cart is kept under.
pub const CART_STORAGE_KEY: &str = "cart_v1";

/// Synchronous client-local storage for the cart.
pub trait LocalCartStorage: Send + Sync {
    /// Stored lines, or an empty cart when nothing was stored yet.
    fn load(&self) -> Result<Vec<CartEntry>, CartSyncError>;
    fn save(&self, lines: &[CartEntry]) -> Result<(), CartSyncError>;
}

/// Key/value storage held in memory.
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored value, as a browser's storage inspector would show it.
    pub fn raw(&self) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(CART_STORAGE_KEY)
            .cloned()
    }
}

impl LocalCartStorage for MemoryCartStorage {
    fn load(&self) -> Result<Vec<CartEntry>, CartSyncError> {
        match self.raw() {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, lines: &[CartEntry]) -> Result<(), CartSyncError> {
        let raw = serde_json::to_string(lines)?;
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(CART_STORAGE_KEY.to_string(), raw);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{CART_STORAGE_KEY}.json"))
    }
}

impl LocalCartStorage for FileCartStorage {
    fn load(&self) -> Result<Vec<CartEntry>, CartSyncError> {
        match fs::read_to_string(self.path()) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(CartSyncError::Storage(err.to_string())),
        }
    }

    fn save(&self, lines: &[CartEntry]) -> Result<(), CartSyncError> {
        fs::create_dir_all(&self.dir).map_err(|e| CartSyncError::Storage(e.to_string()))?;
        let raw = serde_json::to_string(lines)?;
        // Replace atomically.
        let tmp = self.dir.join(format!("{CART_STORAGE_KEY}.json.tmp"));
        fs::write(&tmp, raw).map_err(|e| CartSyncError::Storage(e.to_string()))?;
        fs::rename(&tmp, self.path()).map_err(|e| CartSyncError::Storage(e.to_string()))
    }
}
