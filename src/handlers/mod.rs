pub mod cart_cookie;
pub mod catalog;
pub mod checkout;
pub mod common;
pub mod debug;
pub mod success;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    auth::EntitlementSigner,
    provider::PaymentProvider,
    services::commerce::{
        CatalogService, CheckoutSessionService, CommercePolicy, EntitlementService,
        ReconciliationService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub checkout_sessions: Arc<CheckoutSessionService>,
    pub entitlements: Arc<EntitlementService>,
}

impl AppServices {
    /// Wires every commerce service to one provider and one immutable policy.
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        policy: CommercePolicy,
        signer: EntitlementSigner,
    ) -> Self {
        let policy = Arc::new(policy);
        Self {
            catalog: Arc::new(CatalogService::new(provider.clone(), policy.clone())),
            reconciliation: Arc::new(ReconciliationService::new(
                provider.clone(),
                policy.clone(),
            )),
            checkout_sessions: Arc::new(CheckoutSessionService::new(provider.clone())),
            entitlements: Arc::new(EntitlementService::new(
                provider,
                policy,
                Arc::new(signer),
            )),
        }
    }
}

/// Storefront routes: JSON API under `/api`, page loaders and actions at the root.
pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/api/catalog", get(catalog::list_catalog))
        .route("/api/cart-cookie", post(cart_cookie::mirror_cart))
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/debug", get(debug::debug_context))
        .route(
            "/checkout",
            get(checkout::checkout_page).post(checkout::checkout_action),
        )
        .route("/success", get(success::success_without_session))
        .route("/success/:session_id", get(success::success_page))
}
