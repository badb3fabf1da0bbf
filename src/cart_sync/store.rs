use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CartSyncError, DebouncedMirror, LocalCartStorage};
use crate::models::CartLine;

/// A cart line as the shopper sees it. Display fields are informational only;
/// the server re-prices from the price id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEntry {
    pub price_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub quantity: u32,
}

impl CartEntry {
    pub fn new(price_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            price_id: price_id.into(),
            name: None,
            unit_amount: None,
            currency: None,
            image: None,
            quantity,
        }
    }
}

/// One shopper's cart.
pub struct CartStore {
    lines: Vec<CartEntry>,
    storage: Box<dyn LocalCartStorage>,
    mirror: Option<DebouncedMirror>,
}

impl CartStore {
    /// Opens the stored cart. Unreadable storage starts an empty cart.
    pub fn open(storage: Box<dyn LocalCartStorage>, mirror: Option<DebouncedMirror>) -> Self {
        let lines = storage.load().unwrap_or_else(|err| {
            warn!(error = %err, "stored cart unreadable, starting empty");
            Vec::new()
        });
        Self {
            lines,
            storage,
            mirror,
        }
    }

    pub fn lines(&self) -> &[CartEntry] {
        &self.lines
    }

    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Adds a line, merging quantities with an existing line for the same price.
    /// A zero quantity counts as one.
    pub fn add(&mut self, entry: CartEntry) -> Result<(), CartSyncError> {
        let quantity = entry.quantity.max(1);
        match self.lines.iter_mut().find(|l| l.price_id == entry.price_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => self.lines.push(CartEntry { quantity, ..entry }),
        }
        self.commit()
    }

    /// Sets a line's quantity; zero or less removes it.
    pub fn set_quantity(&mut self, price_id: &str, quantity: i64) -> Result<(), CartSyncError> {
        if quantity <= 0 {
            return self.remove(price_id);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.lines.iter_mut().find(|l| l.price_id == price_id) {
            line.quantity = quantity;
        }
        self.commit()
    }

    pub fn remove(&mut self, price_id: &str) -> Result<(), CartSyncError> {
        self.lines.retain(|line| line.price_id != price_id);
        self.commit()
    }

    pub fn clear(&mut self) -> Result<(), CartSyncError> {
        self.lines.clear();
        self.commit()
    }

    /// Sends any pending mirror write now, e.g. before navigating to checkout.
    pub async fn flush(&self) -> Result<(), CartSyncError> {
        match &self.mirror {
            Some(mirror) => mirror.flush().await,
            None => Ok(()),
        }
    }

    /// Ids and quantities only; never amounts.
    pub fn mirror_lines(&self) -> Vec<CartLine> {
        self.lines
            .iter()
            .map(|line| CartLine::new(line.price_id.clone(), line.quantity))
            .collect()
    }

    fn commit(&mut self) -> Result<(), CartSyncError> {
        self.storage.save(&self.lines)?;
        if let Some(mirror) = &self.mirror {
            mirror.schedule(self.mirror_lines());
        }
        Ok(())
    }
}
