use axum::{
    body::Bytes,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    errors::ServiceError,
    models::{parse_untrusted_cart, CartLine},
};

/// Cart mirror cookie name
pub const CART_COOKIE: &str = "cart";
/// Entitlement credential cookie name
pub const ENTITLEMENT_COOKIE: &str = "entitled";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Success response that must never be cached
pub fn no_store_response<T: Serialize>(data: T) -> Response {
    let mut response = success_response(data);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Parses a request body as JSON without trusting its shape.
pub fn parse_json_body(body: &Bytes, error_message: &str) -> Result<Value, ServiceError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "request body is not JSON");
        ServiceError::InvalidInput(error_message.to_string())
    })
}

/// Encodes cart lines for the mirror cookie: base64url JSON, ids and quantities only.
pub fn encode_cart_cookie(lines: &[CartLine]) -> Result<String, ServiceError> {
    let json = serde_json::to_vec(lines)
        .map_err(|e| ServiceError::InternalError(format!("cart encoding failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decodes the mirror cookie. Raw JSON is accepted too; anything unreadable is an empty cart.
pub fn decode_cart_cookie(raw: &str) -> Vec<CartLine> {
    let raw = raw.trim();
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .or_else(|| serde_json::from_str::<Value>(raw).ok());

    match decoded {
        Some(value) => parse_untrusted_cart(&value),
        None => {
            debug!("unreadable cart cookie treated as empty");
            Vec::new()
        }
    }
}

/// Cart lines from the request's mirror cookie.
pub fn cart_from_jar(jar: &CookieJar) -> Vec<CartLine> {
    jar.get(CART_COOKIE)
        .map(|cookie| decode_cart_cookie(cookie.value()))
        .unwrap_or_default()
}

pub fn cart_cookie(value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((CART_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub fn entitlement_cookie(token: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((ENTITLEMENT_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}
