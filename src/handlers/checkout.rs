use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use tracing::instrument;

use super::common::{cart_from_jar, no_store_response, parse_json_body, success_response};
use crate::{
    errors::ServiceError,
    models::CartLine,
    provider::CHECKOUT_SESSION_ID_PLACEHOLDER,
    AppState,
};

const MISSING_ITEMS: &str = "Missing or invalid `items` array";
const BAD_ITEM: &str = "Each item needs either `price` or full `price_data`.";

fn success_template(state: &AppState) -> String {
    format!(
        "{}/success/{}",
        state.config.origin(),
        CHECKOUT_SESSION_ID_PLACEHOLDER
    )
}

/// `GET /checkout`: the reconciled cart for the review page.
pub async fn checkout_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, ServiceError> {
    let lines = cart_from_jar(&jar);
    let cart = state.services.reconciliation.price_cart(&lines).await?;
    Ok(no_store_response(cart))
}

/// `POST /checkout`: reconcile the mirrored cart and redirect to hosted checkout.
#[instrument(skip_all)]
pub async fn checkout_action(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Redirect, ServiceError> {
    let lines = cart_from_jar(&jar);
    let cart = state.services.reconciliation.price_cart(&lines).await?;
    if cart.is_empty() {
        return Err(ServiceError::EmptyOrInvalidCart);
    }

    let cancel_url = format!("{}/checkout", state.config.origin());
    let session = state
        .services
        .checkout_sessions
        .build_session(&cart, &success_template(&state), &cancel_url)
        .await?;
    Ok(Redirect::to(&session.url))
}

/// Shape check for one `POST /api/checkout` item. Returns the catalog price id,
/// or `None` for a well-formed ad-hoc `price_data` item.
fn checked_item(item: &Value) -> Result<Option<CartLine>, ServiceError> {
    let bad_item = || ServiceError::InvalidInput(BAD_ITEM.to_string());
    let object = item.as_object().ok_or_else(bad_item)?;
    let quantity = object.get("quantity").cloned().unwrap_or(Value::Null);

    if let Some(price) = object.get("price") {
        let price = price.as_str().map(str::trim).filter(|p| !p.is_empty());
        return price
            .map(|id| {
                Some(CartLine {
                    price_id: id.to_string(),
                    quantity,
                })
            })
            .ok_or_else(bad_item);
    }

    let price_data = object.get("price_data").ok_or_else(bad_item)?;
    let complete = price_data.get("currency").and_then(Value::as_str).is_some()
        && price_data.get("unit_amount").and_then(Value::as_i64).is_some()
        && price_data
            .get("product_data")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .is_some();
    if complete {
        Ok(None)
    } else {
        Err(bad_item())
    }
}

/// `POST /api/checkout` with `{items: [...]}`.
///
/// Items are shape-checked, then re-priced through reconciliation like any
/// other cart. Ad-hoc `price_data` items name no catalog price, so they never
/// reach the provider.
#[instrument(skip_all)]
pub async fn create_checkout(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let payload = parse_json_body(&body, MISSING_ITEMS)?;
    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput(MISSING_ITEMS.to_string()))?;

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        if let Some(line) = checked_item(item)? {
            lines.push(line);
        }
    }

    let cart = state.services.reconciliation.price_cart(&lines).await?;
    let cancel_url = format!("{}/cancel", state.config.origin());
    let session = state
        .services
        .checkout_sessions
        .build_session(&cart, &success_template(&state), &cancel_url)
        .await?;

    Ok(success_response(json!({ "url": session.url })).into_response())
}
