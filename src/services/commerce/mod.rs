/// Commerce services: the trust boundary between browser carts and the payment provider
pub mod catalog_service;
pub mod checkout_session_service;
pub mod entitlement_service;
pub mod reconciliation_service;

use std::time::Duration;

use crate::{config::AppConfig, models::AllowSet};

// Re-export services for convenience
pub use catalog_service::CatalogService;
pub use checkout_session_service::{CheckoutSessionService, SessionHandle};
pub use entitlement_service::{EntitlementGrant, EntitlementService, VerificationOutcome};
pub use reconciliation_service::ReconciliationService;

/// Immutable trust configuration shared by the commerce services.
///
/// Built once at startup and passed to each service constructor.
#[derive(Debug, Clone)]
pub struct CommercePolicy {
    pub allow_set: AllowSet,
    pub default_currency: String,
    pub catalog_page_limit: u32,
    pub max_cart_lines: usize,
    pub entitlement_ttl: Duration,
}

impl CommercePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            allow_set: AllowSet::from_csv(&config.allowed_price_ids),
            default_currency: config.default_currency.to_lowercase(),
            catalog_page_limit: config.catalog_page_limit,
            max_cart_lines: config.max_cart_lines,
            entitlement_ttl: Duration::from_secs(config.entitlement_ttl_secs),
        }
    }
}

impl Default for CommercePolicy {
    fn default() -> Self {
        Self {
            allow_set: AllowSet::default(),
            default_currency: "usd".to_string(),
            catalog_page_limit: 100,
            max_cart_lines: 50,
            entitlement_ttl: Duration::from_secs(15 * 60),
        }
    }
}
