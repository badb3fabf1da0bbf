use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{CheckoutLineItem, Recurring};

/// A cart line as the browser reports it. Only the price id and quantity are
/// read; the quantity is kept raw until [`normalize_quantity`] is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub price_id: String,
    #[serde(default)]
    pub quantity: Value,
}

impl CartLine {
    pub fn new(price_id: impl Into<String>, quantity: u32) -> Self {
        CartLine {
            price_id: price_id.into(),
            quantity: Value::from(quantity),
        }
    }

    pub fn normalized_quantity(&self) -> u32 {
        normalize_quantity(&self.quantity)
    }
}

/// Coerces an attacker-controlled quantity to a positive integer.
///
/// Numbers and numeric strings are truncated; anything non-finite,
/// non-numeric, or below one becomes one. Large values saturate at `u32::MAX`.
pub fn normalize_quantity(raw: &Value) -> u32 {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(q) if q.is_finite() && q >= 1.0 => {
            if q >= u32::MAX as f64 {
                u32::MAX
            } else {
                q.trunc() as u32
            }
        }
        _ => 1,
    }
}

/// Reads cart lines out of an arbitrary JSON document.
///
/// A non-array yields an empty cart. Elements without a non-empty string
/// `priceId` (or `price`) are skipped.
pub fn parse_untrusted_cart(value: &Value) -> Vec<CartLine> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let price_id = object
                .get("priceId")
                .or_else(|| object.get("price"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())?;
            Some(CartLine {
                price_id: price_id.to_string(),
                quantity: object.get("quantity").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

/// One authoritative, allowlisted cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledLine {
    pub price_id: String,
    pub quantity: u32,
    pub unit_amount: i64,
    pub line_total: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
}

/// Output of reconciliation. `items` keeps first-seen cart order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCart {
    pub items: Vec<ReconciledLine>,
    pub subtotal: i64,
    pub currency: String,
    pub checkout_line_items: Vec<CheckoutLineItem>,
}

impl PricedCart {
    pub fn empty(currency: &str) -> Self {
        PricedCart {
            items: Vec::new(),
            subtotal: 0,
            currency: currency.to_string(),
            checkout_line_items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_recurring(&self) -> bool {
        self.items.iter().any(|line| line.recurring.is_some())
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }
}
