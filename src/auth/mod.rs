/*!
 * Entitlement credentials
 *
 * After a verified purchase the storefront hands the browser a short-lived
 * HS256 JWT listing the purchased price ids. Content gates verify it with
 * [`EntitlementSigner::verify`]; the server keeps no copy.
 */

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Claims carried by the entitlement cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementClaims {
    pub prices: Vec<String>, // Purchased, allowlisted price ids
    pub iat: i64,            // Issued at
    pub exp: i64,            // Expiration
    pub jti: String,         // Token id
}

impl EntitlementClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn covers(&self, price_id: &str) -> bool {
        self.prices.iter().any(|p| p == price_id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntitlementTokenError {
    #[error("Token creation failed: {0}")]
    Creation(String),
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

#[derive(Clone)]
pub struct EntitlementSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for EntitlementSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl EntitlementSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a credential for `prices`, valid for the configured TTL from `now`.
    pub fn issue_at(
        &self,
        prices: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(EntitlementClaims, String), EntitlementTokenError> {
        let ttl = ChronoDuration::from_std(self.ttl)
            .map_err(|_| EntitlementTokenError::Creation("Invalid token duration".to_string()))?;

        let claims = EntitlementClaims {
            prices,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| EntitlementTokenError::Creation(e.to_string()))?;

        Ok((claims, token))
    }

    pub fn issue(
        &self,
        prices: Vec<String>,
    ) -> Result<(EntitlementClaims, String), EntitlementTokenError> {
        self.issue_at(prices, Utc::now())
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Result<EntitlementClaims, EntitlementTokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims = ["exp", "iat"].iter().map(|c| c.to_string()).collect();

        decode::<EntitlementClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => EntitlementTokenError::Expired,
                _ => EntitlementTokenError::Invalid,
            })
    }
}
