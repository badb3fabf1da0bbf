use std::sync::Arc;

use metrics::counter;
use tracing::{info, instrument};

use super::CommercePolicy;
use crate::{errors::ServiceError, models::CatalogItem, provider::PaymentProvider};

/// Resolves the sellable catalog from the provider's active prices.
#[derive(Clone)]
pub struct CatalogService {
    provider: Arc<dyn PaymentProvider>,
    policy: Arc<CommercePolicy>,
}

impl CatalogService {
    pub fn new(provider: Arc<dyn PaymentProvider>, policy: Arc<CommercePolicy>) -> Self {
        Self { provider, policy }
    }

    /// Active, allowlisted prices as catalog items, in provider order.
    ///
    /// Any provider failure fails the whole call; there is no cached fallback.
    #[instrument(skip(self))]
    pub async fn resolve_catalog(&self) -> Result<Vec<CatalogItem>, ServiceError> {
        let prices = self
            .provider
            .list_active_prices(self.policy.catalog_page_limit)
            .await?;
        let fetched = prices.len();

        let items: Vec<CatalogItem> = prices
            .iter()
            .filter(|price| price.active && self.policy.allow_set.permits_catalog(&price.id))
            .filter_map(CatalogItem::from_price)
            .collect();

        counter!("storefront.catalog.resolved", 1);
        info!(fetched, listed = items.len(), "catalog resolved");
        Ok(items)
    }
}
