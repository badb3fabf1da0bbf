//! Payment provider boundary.
//!
//! Everything the storefront knows about prices and completed payments comes
//! through [`PaymentProvider`]. The production implementation talks to Stripe
//! over HTTPS; tests substitute an in-memory fake or a mock.

pub mod stripe;
pub mod types;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

pub use stripe::{StripeClient, StripeClientConfig};
pub use types::{
    CheckoutLineItem, CheckoutSession, CheckoutSessionRequest, CustomerDetails, Expandable,
    LineItem, List, PaymentStatus, Price, Product, Recurring, SessionMode,
    CHECKOUT_SESSION_ID_PLACEHOLDER,
};

static PROVIDER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Provider object ids are placed in URL paths; anything outside this alphabet
/// is never sent upstream.
pub fn is_valid_provider_id(id: &str) -> bool {
    id.len() <= 255 && PROVIDER_ID.is_match(id)
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Active prices, each with its product expanded.
    async fn list_active_prices(&self, limit: u32) -> Result<Vec<Price>, ProviderError>;

    /// A single price with its product expanded.
    async fn retrieve_price(&self, price_id: &str) -> Result<Price, ProviderError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    /// A checkout session with `line_items.data.price` expanded.
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError>;
}
