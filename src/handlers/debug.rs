use axum::{extract::Extension, Json};
use serde_json::{json, Value};

use crate::experiments::ExperimentContext;

/// `GET /api/debug`: the experiment assignments attached to this request.
pub async fn debug_context(context: Option<Extension<ExperimentContext>>) -> Json<Value> {
    match context {
        Some(Extension(context)) => Json(json!({
            "experiments": context.assignments,
            "anonId": context.anon_id,
        })),
        None => Json(json!({ "experiments": null, "anonId": null })),
    }
}
