use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    errors::ServiceError,
    models::PricedCart,
    provider::{
        CheckoutSessionRequest, PaymentProvider, SessionMode, CHECKOUT_SESSION_ID_PLACEHOLDER,
    },
};

/// Provider-issued checkout session the caller redirects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    pub id: String,
    pub url: String,
}

/// Builds provider checkout sessions from reconciled carts.
#[derive(Clone)]
pub struct CheckoutSessionService {
    provider: Arc<dyn PaymentProvider>,
}

impl CheckoutSessionService {
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }

    /// Creates a single-payment card session, or a subscription session when
    /// any line is recurring. Nothing is retried.
    #[instrument(skip(self, cart), fields(lines = cart.items.len(), subtotal = cart.subtotal))]
    pub async fn build_session(
        &self,
        cart: &PricedCart,
        success_template: &str,
        cancel_url: &str,
    ) -> Result<SessionHandle, ServiceError> {
        if cart.checkout_line_items.is_empty() || cart.subtotal <= 0 {
            return Err(ServiceError::EmptyOrInvalidCart);
        }
        if !success_template.contains(CHECKOUT_SESSION_ID_PLACEHOLDER) {
            return Err(ServiceError::InternalError(format!(
                "success URL lacks {CHECKOUT_SESSION_ID_PLACEHOLDER}"
            )));
        }

        let mode = if cart.has_recurring() {
            SessionMode::Subscription
        } else {
            SessionMode::Payment
        };
        let request = CheckoutSessionRequest {
            mode,
            line_items: cart.checkout_line_items.clone(),
            success_url: success_template.to_string(),
            cancel_url: cancel_url.to_string(),
        };

        let session = self.provider.create_checkout_session(&request).await?;
        let url = session.url.ok_or_else(|| {
            ServiceError::ProviderUnavailable(format!("session {} has no redirect url", session.id))
        })?;

        counter!("storefront.checkout.sessions_created", 1);
        info!(session_id = %session.id, mode = mode.as_str(), "checkout session created");
        Ok(SessionHandle {
            id: session.id,
            url,
        })
    }
}
