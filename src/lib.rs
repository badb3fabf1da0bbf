//! Storefront API Library
//!
//! Cart reconciliation and entitlement verification for a storefront backed by
//! a hosted payment provider. Client carts are never trusted for prices; every
//! amount comes from the provider and every purchase is re-verified before
//! content is unlocked.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cart_sync;
pub mod config;
pub mod errors;
pub mod experiments;
pub mod handlers;
pub mod middleware_helpers;
pub mod models;
pub mod provider;
pub mod services;
pub mod tracing;

use axum::{extract::DefaultBodyLimit, middleware, response::Json, routing::get, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    auth::EntitlementSigner,
    config::AppConfig,
    experiments::{ExperimentRegistry, VariantAssigner},
    handlers::AppServices,
    provider::PaymentProvider,
    services::commerce::CommercePolicy,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: AppServices,
    pub experiments: Arc<ExperimentRegistry>,
    pub assigner: Option<Arc<dyn VariantAssigner>>,
}

impl AppState {
    /// Builds the state from configuration and a provider implementation.
    pub fn new(config: AppConfig, provider: Arc<dyn PaymentProvider>) -> Self {
        let policy = CommercePolicy::from_config(&config);
        let signer = EntitlementSigner::new(&config.entitlement_secret, config.entitlement_ttl());
        let experiments = ExperimentRegistry::new(&config.experiments);

        Self {
            services: AppServices::new(provider, policy, signer),
            experiments: Arc::new(experiments),
            config: Arc::new(config),
            assigner: None,
        }
    }

    /// Wires an external experiment assignment engine.
    pub fn with_assigner(mut self, assigner: Arc<dyn VariantAssigner>) -> Self {
        self.assigner = Some(assigner);
        self
    }
}

/// Full application router: storefront routes, status endpoints, request ids,
/// HTTP tracing and the body limit. CORS and timeouts are layered by the binary.
pub fn app_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(handlers::storefront_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_helpers::experiment_context_middleware,
        ))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(middleware_helpers::request_id_middleware))
        .with_state(state)
}

async fn api_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "storefront-api",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
