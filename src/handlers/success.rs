use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use super::common::{entitlement_cookie, no_store_response};
use crate::{errors::ServiceError, AppState};

/// `GET /success/:session_id`: verify the purchase and set the entitlement cookie.
pub async fn success_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(session_id): Path<String>,
) -> Result<Response, ServiceError> {
    let grant = state
        .services
        .entitlements
        .verify_entitlement(Some(&session_id))
        .await?;

    let max_age = state.services.entitlements.signer().ttl().as_secs() as i64;
    let cookie = entitlement_cookie(grant.token.clone(), max_age, state.config.cookie_secure);
    Ok((jar.add(cookie), no_store_response(&grant)).into_response())
}

/// `GET /success` without a session id goes back home.
pub async fn success_without_session() -> ServiceError {
    ServiceError::MissingSession
}
