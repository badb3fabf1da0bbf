//! Wire types for the subset of the Stripe API the storefront consumes.

use serde::{Deserialize, Serialize};

/// Placeholder Stripe substitutes with the real session id on redirect.
pub const CHECKOUT_SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// A field that is either a bare id or, when requested via `expand[]`, the full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Object(Box<T>),
    Id(String),
}

pub trait Identified {
    fn object_id(&self) -> &str;
}

impl<T: Identified> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(object) => object.object_id(),
        }
    }

    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Object(object) => Some(object),
            Expandable::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl Identified for Product {
    fn object_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurring {
    pub interval: String,
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
}

fn default_interval_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    pub currency: String,
    /// Amount in minor currency units; absent for custom or tiered prices.
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub nickname: Option<String>,
    pub product: Expandable<Product>,
    #[serde(default)]
    pub recurring: Option<Recurring>,
}

impl Identified for Price {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl Price {
    /// Display name: the expanded product's name, then the nickname, then a generic label.
    pub fn display_name(&self) -> String {
        self.product
            .as_object()
            .map(|product| product.name.trim())
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.nickname
                    .as_deref()
                    .map(str::trim)
                    .filter(|nick| !nick.is_empty())
            })
            .unwrap_or("Item")
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Payment,
    Subscription,
    Setup,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Payment => "payment",
            SessionMode::Subscription => "subscription",
            SessionMode::Setup => "setup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default)]
    pub price: Option<Expandable<Price>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub mode: Option<SessionMode>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub line_items: Option<List<LineItem>>,
}

impl CheckoutSession {
    /// Price ids referenced by the expanded line items, in order, without duplicates.
    /// Line items without a price reference are skipped.
    pub fn purchased_price_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let items = self.line_items.as_ref().map(|list| list.data.as_slice());
        for price in items.unwrap_or_default().iter().filter_map(|li| li.price.as_ref()) {
            let id = price.id();
            if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details.as_ref()?.email.as_deref()
    }
}

/// One `line_items[n]` entry of a session creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub price: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub mode: SessionMode,
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSessionRequest {
    /// Form fields in the bracketed encoding Stripe expects.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), self.mode.as_str().to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];
        for (index, item) in self.line_items.iter().enumerate() {
            form.push((format!("line_items[{index}][price]"), item.price.clone()));
            form.push((
                format!("line_items[{index}][quantity]"),
                item.quantity.to_string(),
            ));
        }
        form
    }
}
