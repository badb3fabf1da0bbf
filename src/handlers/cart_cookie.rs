use axum::{body::Bytes, extract::State, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use serde_json::Value;
use tracing::{debug, warn};

use super::common::{cart_cookie, encode_cart_cookie};
use crate::{
    errors::ServiceError,
    models::{parse_untrusted_cart, CartLine},
    AppState,
};

/// Browsers drop cookies larger than this.
const COOKIE_VALUE_LIMIT: usize = 4000;

/// `POST /api/cart-cookie` with `{cart: [...]}`.
///
/// Mirrors the browser cart into the `cart` cookie. Only price ids and
/// normalized quantities are kept. Always answers `ok`.
pub async fn mirror_cart(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|mut payload| payload.get_mut("cart").map(Value::take))
        .unwrap_or(Value::Null);

    let lines: Vec<CartLine> = parse_untrusted_cart(&cart)
        .into_iter()
        .map(|line| {
            let quantity = line.normalized_quantity();
            CartLine::new(line.price_id, quantity)
        })
        .collect();
    debug!(lines = lines.len(), "mirroring cart");

    let value = encode_cart_cookie(&lines)?;
    if value.len() > COOKIE_VALUE_LIMIT {
        warn!(bytes = value.len(), "cart cookie exceeds browser limits");
    }

    let cookie = cart_cookie(
        value,
        state.config.cart_cookie_max_age_secs,
        state.config.cookie_secure,
    );
    Ok((jar.add(cookie), "ok"))
}
