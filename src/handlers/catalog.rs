use axum::{extract::State, response::Response};
use serde_json::json;

use super::common::success_response;
use crate::{errors::ServiceError, AppState};

/// Collection page data: active, allowlisted catalog items.
pub async fn list_catalog(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let items = state.services.catalog.resolve_catalog().await?;
    Ok(success_response(json!({ "items": items })))
}
