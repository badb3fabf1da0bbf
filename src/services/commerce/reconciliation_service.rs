use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use super::CommercePolicy;
use crate::{
    errors::ServiceError,
    models::{CartLine, PricedCart, ReconciledLine},
    provider::{CheckoutLineItem, PaymentProvider, Price},
};

/// Re-prices untrusted carts from authoritative provider records.
///
/// This is the only place a price amount enters the checkout path; the
/// client's view of amounts and totals is never read.
#[derive(Clone)]
pub struct ReconciliationService {
    provider: Arc<dyn PaymentProvider>,
    policy: Arc<CommercePolicy>,
}

/// Distinct price id with its merged quantity, in first-seen order.
#[derive(Debug, PartialEq, Eq)]
struct MergedLine {
    price_id: String,
    quantity: u32,
}

fn merge_lines(lines: &[CartLine]) -> Vec<MergedLine> {
    let mut merged: Vec<MergedLine> = Vec::new();
    for line in lines {
        let quantity = line.normalized_quantity();
        match merged.iter_mut().find(|m| m.price_id == line.price_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => merged.push(MergedLine {
                price_id: line.price_id.clone(),
                quantity,
            }),
        }
    }
    merged
}

/// Distinct requested ids that did not survive reconciliation. Duplicates
/// merged into one line are not drops.
fn dropped_lines(distinct: usize, kept: usize) -> u64 {
    distinct.saturating_sub(kept) as u64
}

impl ReconciliationService {
    pub fn new(provider: Arc<dyn PaymentProvider>, policy: Arc<CommercePolicy>) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &CommercePolicy {
        &self.policy
    }

    /// Fetches one price, absorbing provider failures into `None`.
    async fn fetch_price(&self, price_id: &str) -> Option<Price> {
        match self.provider.retrieve_price(price_id).await {
            Ok(price) => Some(price),
            Err(err) if err.is_not_found() => {
                debug!(price_id, "cart references unknown price");
                None
            }
            Err(err) => {
                warn!(price_id, error = %err, "price lookup failed, dropping line");
                None
            }
        }
    }

    /// Reconciles `lines` into a priced cart.
    ///
    /// Lines whose price is unknown, inactive, amountless, or outside the
    /// allow set are dropped. Duplicate ids are merged before any fetch.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn price_cart(&self, lines: &[CartLine]) -> Result<PricedCart, ServiceError> {
        let merged = merge_lines(lines);
        if merged.is_empty() {
            return Ok(PricedCart::empty(&self.policy.default_currency));
        }
        let distinct = merged.len();

        let (allowed, refused): (Vec<MergedLine>, Vec<MergedLine>) = merged
            .into_iter()
            .partition(|line| self.policy.allow_set.contains(&line.price_id));
        if !refused.is_empty() {
            debug!(count = refused.len(), "dropping lines outside the allow set");
        }
        if allowed.len() > self.policy.max_cart_lines {
            return Err(ServiceError::InvalidInput(format!(
                "Cart has more than {} distinct items",
                self.policy.max_cart_lines
            )));
        }

        let fetched = join_all(allowed.iter().map(|line| self.fetch_price(&line.price_id))).await;

        let mut items = Vec::with_capacity(allowed.len());
        let mut currency: Option<String> = None;
        let mut subtotal: i64 = 0;

        for (line, price) in allowed.into_iter().zip(fetched) {
            let Some(price) = price.filter(|p| p.active && p.id == line.price_id) else {
                continue;
            };
            let Some(unit_amount) = price.unit_amount.filter(|amount| *amount >= 0) else {
                debug!(price_id = %price.id, "price has no fixed unit amount");
                continue;
            };

            let price_currency = price.currency.to_lowercase();
            match &currency {
                Some(seen) if *seen != price_currency => {
                    return Err(ServiceError::InvalidInput(
                        "Cart mixes currencies".to_string(),
                    ));
                }
                Some(_) => {}
                None => currency = Some(price_currency),
            }

            let line_total = unit_amount
                .checked_mul(i64::from(line.quantity))
                .ok_or_else(|| ServiceError::InvalidInput("Cart total is too large".to_string()))?;
            subtotal = subtotal
                .checked_add(line_total)
                .ok_or_else(|| ServiceError::InvalidInput("Cart total is too large".to_string()))?;

            items.push(ReconciledLine {
                name: price.display_name(),
                image: price
                    .product
                    .as_object()
                    .and_then(|product| product.images.first().cloned()),
                recurring: price.recurring.clone(),
                price_id: line.price_id,
                quantity: line.quantity,
                unit_amount,
                line_total,
            });
        }

        let dropped = dropped_lines(distinct, items.len());
        if dropped > 0 {
            counter!("storefront.cart.lines_dropped", dropped);
        }
        info!(distinct, kept = items.len(), subtotal, "cart reconciled");

        let checkout_line_items = items
            .iter()
            .map(|line| CheckoutLineItem {
                price: line.price_id.clone(),
                quantity: line.quantity,
            })
            .collect();

        Ok(PricedCart {
            items,
            subtotal,
            currency: currency.unwrap_or_else(|| self.policy.default_currency.clone()),
            checkout_line_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AllowSet;
    use crate::provider::ProviderError;
    use crate::services::commerce::test_support::{price, MockProvider};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn service(provider: MockProvider, allow: &[&str]) -> ReconciliationService {
        let policy = CommercePolicy {
            allow_set: AllowSet::new(allow.iter().copied()),
            max_cart_lines: 3,
            ..CommercePolicy::default()
        };
        ReconciliationService::new(Arc::new(provider), Arc::new(policy))
    }

    fn line(id: &str, quantity: serde_json::Value) -> CartLine {
        CartLine {
            price_id: id.to_string(),
            quantity,
        }
    }

    #[test]
    fn merge_sums_quantities_in_first_seen_order() {
        let merged = merge_lines(&[
            line("price_b", json!(2)),
            line("price_a", json!("x")),
            line("price_b", json!(3)),
        ]);
        assert_eq!(
            merged,
            vec![
                MergedLine { price_id: "price_b".into(), quantity: 5 },
                MergedLine { price_id: "price_a".into(), quantity: 1 },
            ]
        );
    }

    #[test]
    fn merged_duplicates_are_not_counted_as_dropped() {
        let lines = [
            line("price_a", json!(1)),
            line("price_a", json!(2)),
            line("price_b", json!(1)),
        ];
        let distinct = merge_lines(&lines).len();
        assert_eq!(dropped_lines(distinct, 2), 0);
        assert_eq!(dropped_lines(distinct, 1), 1);
    }

    #[tokio::test]
    async fn empty_cart_is_not_an_error() {
        let cart = service(MockProvider::new(), &["price_a"])
            .price_cart(&[])
            .await
            .unwrap();
        assert_eq!(cart, PricedCart::empty("usd"));
    }

    #[tokio::test]
    async fn duplicate_ids_are_fetched_once_and_merged() {
        let mut provider = MockProvider::new();
        provider
            .expect_retrieve_price()
            .times(1)
            .returning(|id| {
                assert_eq!(id, "price_a");
                Ok(price(id, 250, "usd"))
            });

        let cart = service(provider, &["price_a"])
            .price_cart(&[line("price_a", json!(2)), line("price_a", json!(3))])
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.items[0].line_total, 1250);
        assert_eq!(cart.subtotal, 1250);
        assert_eq!(
            cart.checkout_line_items,
            vec![CheckoutLineItem { price: "price_a".into(), quantity: 5 }]
        );
    }

    #[tokio::test]
    async fn unknown_failed_and_unlisted_prices_are_dropped() {
        let mut provider = MockProvider::new();
        provider.expect_retrieve_price().returning(|id| match id {
            "price_a" => Ok(price(id, 100, "usd")),
            "price_gone" => Err(ProviderError::NotFound(id.to_string())),
            _ => Err(ProviderError::Transport("reset".into())),
        });

        let cart = service(provider, &["price_a", "price_gone", "price_flaky"])
            .price_cart(&[
                line("price_gone", json!(1)),
                line("price_a", json!(1)),
                line("price_flaky", json!(1)),
            ])
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].price_id, "price_a");

        // Ids outside the allow set never reach the provider.
        let mut provider = MockProvider::new();
        provider.expect_retrieve_price().never();
        let cart = service(provider, &["price_a"])
            .price_cart(&[line("price_free_lunch", json!(1))])
            .await
            .unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn inactive_allowlisted_prices_are_dropped() {
        // Archived prices cannot be sold in a checkout session.
        let mut provider = MockProvider::new();
        provider.expect_retrieve_price().times(2).returning(|id| {
            let mut p = price(id, 500, "usd");
            p.active = id != "price_archived";
            Ok(p)
        });

        let cart = service(provider, &["price_a", "price_archived"])
            .price_cart(&[line("price_archived", json!(1)), line("price_a", json!(2))])
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].price_id, "price_a");
        assert_eq!(cart.subtotal, 1000);
        assert_eq!(cart.checkout_line_items.len(), 1);
    }

    #[tokio::test]
    async fn client_amounts_are_ignored_and_quantities_normalized() {
        let mut provider = MockProvider::new();
        provider
            .expect_retrieve_price()
            .returning(|id| Ok(price(id, 900, "usd")));

        let lines = crate::models::parse_untrusted_cart(&json!([
            {"priceId": "price_a", "quantity": -1, "unitAmount": 1},
            {"priceId": "price_b", "quantity": "abc", "unitAmount": 1}
        ]));
        let cart = service(provider, &["price_a", "price_b"])
            .price_cart(&lines)
            .await
            .unwrap();

        assert!(cart.items.iter().all(|l| l.quantity == 1 && l.unit_amount == 900));
        assert_eq!(cart.subtotal, 1800);
    }

    #[tokio::test]
    async fn mixed_currencies_are_rejected() {
        let mut provider = MockProvider::new();
        provider.expect_retrieve_price().returning(|id| match id {
            "price_a" => Ok(price(id, 100, "usd")),
            _ => Ok(price(id, 100, "eur")),
        });

        let err = service(provider, &["price_a", "price_b"])
            .price_cart(&[line("price_a", json!(1)), line("price_b", json!(1))])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(msg) if msg.contains("currencies"));
    }

    #[tokio::test]
    async fn too_many_allowlisted_lines_fail_before_fetching() {
        let mut provider = MockProvider::new();
        provider.expect_retrieve_price().never();

        let ids = ["price_0", "price_1", "price_2", "price_3"];
        let lines: Vec<_> = ids.iter().map(|id| line(id, json!(1))).collect();
        let err = service(provider, &ids).price_cart(&lines).await.unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }

    #[tokio::test]
    async fn unlisted_lines_do_not_count_toward_the_line_cap() {
        let mut provider = MockProvider::new();
        provider
            .expect_retrieve_price()
            .times(1)
            .returning(|id| Ok(price(id, 4900, "usd")));

        let mut lines: Vec<_> = (0..51)
            .map(|i| line(&format!("price_junk{i}"), json!(1)))
            .collect();
        lines.push(line("price_course", json!(1)));

        let cart = service(provider, &["price_course"])
            .price_cart(&lines)
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].price_id, "price_course");
        assert_eq!(cart.subtotal, 4900);
    }

    #[tokio::test]
    async fn overflowing_totals_are_rejected() {
        let mut provider = MockProvider::new();
        provider
            .expect_retrieve_price()
            .returning(|id| Ok(price(id, i64::MAX / 2, "usd")));

        let err = service(provider, &["price_a"])
            .price_cart(&[line("price_a", json!(3))])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }

    #[tokio::test]
    async fn recurring_metadata_is_carried() {
        let mut provider = MockProvider::new();
        provider.expect_retrieve_price().returning(|id| {
            let mut p = price(id, 500, "usd");
            p.recurring = Some(crate::provider::Recurring {
                interval: "month".into(),
                interval_count: 1,
            });
            Ok(p)
        });

        let cart = service(provider, &["price_sub"])
            .price_cart(&[line("price_sub", json!(1))])
            .await
            .unwrap();
        assert!(cart.has_recurring());
    }
}
