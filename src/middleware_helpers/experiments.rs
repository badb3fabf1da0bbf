use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;

/// Attaches the assignment engine's [`ExperimentContext`](crate::experiments::ExperimentContext)
/// to the request. Without an engine the request passes through untouched.
pub async fn experiment_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(assigner) = state.assigner.as_ref() {
        let context = assigner.assign(&state.experiments, request.headers());
        tracing::debug!(assigned = context.assignments.len(), "experiment context attached");
        request.extensions_mut().insert(context);
    }
    next.run(request).await
}
