use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::CommercePolicy;
use crate::{
    auth::{EntitlementClaims, EntitlementSigner},
    errors::ServiceError,
    models::AllowSet,
    provider::{CheckoutSession, PaymentProvider, PaymentStatus, ProviderError},
};

/// Result of checking a retrieved session against the allow set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Paid, and these allowlisted prices were purchased.
    PaidEntitled(Vec<String>),
    PaidNotEntitled,
    Unpaid,
}

impl VerificationOutcome {
    /// Purchased prices outside the allow set are left out of the grant.
    pub fn classify(session: &CheckoutSession, allow_set: &AllowSet) -> Self {
        if session.payment_status != PaymentStatus::Paid {
            return VerificationOutcome::Unpaid;
        }
        let entitled: Vec<String> = session
            .purchased_price_ids()
            .into_iter()
            .filter(|id| allow_set.contains(id))
            .collect();
        if entitled.is_empty() {
            VerificationOutcome::PaidNotEntitled
        } else {
            VerificationOutcome::PaidEntitled(entitled)
        }
    }
}

/// A verified purchase: signed credential plus what the success page shows.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementGrant {
    #[serde(skip)]
    pub claims: EntitlementClaims,
    #[serde(skip)]
    pub token: String,
    pub email: Option<String>,
    pub prices: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Verifies completed checkouts and issues entitlement credentials.
#[derive(Clone)]
pub struct EntitlementService {
    provider: Arc<dyn PaymentProvider>,
    policy: Arc<CommercePolicy>,
    signer: Arc<EntitlementSigner>,
}

impl EntitlementService {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        policy: Arc<CommercePolicy>,
        signer: Arc<EntitlementSigner>,
    ) -> Self {
        Self {
            provider,
            policy,
            signer,
        }
    }

    pub fn signer(&self) -> &EntitlementSigner {
        &self.signer
    }

    /// Re-fetches the session and issues a credential only for a paid session
    /// that bought at least one allowlisted price.
    #[instrument(skip(self))]
    pub async fn verify_entitlement(
        &self,
        session_id: Option<&str>,
    ) -> Result<EntitlementGrant, ServiceError> {
        let session_id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ServiceError::MissingSession),
        };

        let session = match self.provider.retrieve_checkout_session(session_id).await {
            Ok(session) => session,
            Err(ProviderError::NotFound(_)) => {
                debug!(session_id, "checkout session not found");
                return Err(ServiceError::MissingSession);
            }
            Err(err) => return Err(err.into()),
        };
        debug!(session_id, status = ?session.payment_status, "checkout session retrieved");

        match VerificationOutcome::classify(&session, &self.policy.allow_set) {
            VerificationOutcome::Unpaid => {
                counter!("storefront.entitlements.unpaid", 1);
                Err(ServiceError::Unpaid)
            }
            VerificationOutcome::PaidNotEntitled => {
                counter!("storefront.entitlements.refused", 1);
                warn!(session_id, purchased = ?session.purchased_price_ids(), "paid session has no entitled price");
                Err(ServiceError::Forbidden(
                    "Not entitled for this product.".to_string(),
                ))
            }
            VerificationOutcome::PaidEntitled(prices) => {
                let (claims, token) = self
                    .signer
                    .issue(prices.clone())
                    .map_err(|e| ServiceError::InternalError(e.to_string()))?;
                let expires_at = claims
                    .expires_at()
                    .ok_or_else(|| ServiceError::InternalError("token expiry out of range".into()))?;

                counter!("storefront.entitlements.granted", 1);
                info!(session_id, entitled = prices.len(), "entitlement granted");
                Ok(EntitlementGrant {
                    email: session.customer_email().map(str::to_string),
                    prices,
                    expires_at,
                    claims,
                    token,
                })
            }
        }
    }
}
