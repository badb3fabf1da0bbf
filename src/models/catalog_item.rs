use serde::{Deserialize, Serialize};

use crate::provider::{Price, Recurring};

/// A sellable item as shown on the collection page.
///
/// Built from a provider price with its product expanded. Optional product
/// fields stay `None` when the provider has nothing for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub product_id: String,
    pub price_id: String,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    /// Minor currency units.
    pub unit_amount: i64,
    pub currency: String,
    pub recurrence: Option<Recurring>,
}

impl CatalogItem {
    /// Returns `None` for prices that cannot be listed: product not expanded,
    /// product deleted, or no fixed unit amount.
    pub fn from_price(price: &Price) -> Option<Self> {
        let product = price.product.as_object()?;
        if product.deleted {
            return None;
        }
        let unit_amount = price.unit_amount?;

        Some(CatalogItem {
            product_id: product.id.clone(),
            price_id: price.id.clone(),
            name: price.display_name(),
            description: product
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            image: product.images.first().cloned(),
            unit_amount,
            currency: price.currency.to_lowercase(),
            recurrence: price.recurring.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn price(value: serde_json::Value) -> Price {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_expanded_price_with_absent_optional_fields() {
        let item = CatalogItem::from_price(&price(json!({
            "id": "price_a", "active": true, "currency": "USD", "unit_amount": 1299,
            "product": {"id": "prod_a", "name": "Trail Map", "description": "  "}
        })))
        .unwrap();

        assert_eq!(item.product_id, "prod_a");
        assert_eq!(item.name, "Trail Map");
        assert_eq!(item.description, None);
        assert_eq!(item.image, None);
        assert_eq!(item.unit_amount, 1299);
        assert_eq!(item.currency, "usd");
    }

    #[test]
    fn skips_unexpanded_or_amountless_prices() {
        assert!(CatalogItem::from_price(&price(json!({
            "id": "price_a", "currency": "usd", "unit_amount": 100, "product": "prod_a"
        })))
        .is_none());

        assert!(CatalogItem::from_price(&price(json!({
            "id": "price_a", "currency": "usd", "unit_amount": null,
            "product": {"id": "prod_a", "name": "Custom"}
        })))
        .is_none());
    }

    #[test]
    fn serializes_in_camel_case() {
        let item = CatalogItem::from_price(&price(json!({
            "id": "price_a", "currency": "usd", "unit_amount": 500,
            "product": {"id": "prod_a", "name": "Sticker", "images": ["https://cdn/s.png"]},
            "recurring": {"interval": "month"}
        })))
        .unwrap();
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["priceId"], "price_a");
        assert_eq!(value["unitAmount"], 500);
        assert_eq!(value["image"], "https://cdn/s.png");
        assert_eq!(value["recurrence"]["interval"], "month");
        assert_eq!(value["recurrence"]["interval_count"], 1);
    }
}
