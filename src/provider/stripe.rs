use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, instrument, warn};

use super::{
    is_valid_provider_id, CheckoutSession, CheckoutSessionRequest, LineItem, List,
    PaymentProvider, Price, ProviderError,
};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

const LINE_ITEM_PAGE_SIZE: &str = "100";

#[derive(Debug, Clone)]
pub struct StripeClientConfig {
    pub secret_key: String,
    pub api_base: String,
    pub api_version: String,
    pub timeout: Duration,
}

/// Stripe REST client covering prices and checkout sessions.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: StripeClientConfig) -> Result<Self, ProviderError> {
        let mut headers = header::HeaderMap::new();
        let version = header::HeaderValue::from_str(&config.api_version)
            .map_err(|e| ProviderError::Transport(format!("invalid api version header: {e}")))?;
        headers.insert("Stripe-Version", version);

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            secret_key: config.secret_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(&self.secret_key)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        decode_response(response, resource).await
    }

    /// The expanded `line_items` holds only the first page. Pages through the
    /// rest so the purchased set is complete; a page without a cursor fails.
    async fn fetch_remaining_line_items(
        &self,
        session_id: &str,
        line_items: &mut List<LineItem>,
    ) -> Result<(), ProviderError> {
        while line_items.has_more {
            let cursor = line_items
                .data
                .last()
                .and_then(|item| item.id.clone())
                .ok_or_else(|| {
                    ProviderError::Decode(format!(
                        "line items of {session_id} cannot be paged without an id"
                    ))
                })?;
            let request = self
                .get(&format!("checkout/sessions/{session_id}/line_items"))
                .query(&[
                    ("expand[]", "data.price"),
                    ("limit", LINE_ITEM_PAGE_SIZE),
                    ("starting_after", cursor.as_str()),
                ]);
            let page: List<LineItem> = self.send(request, session_id).await?;
            debug!(session_id, fetched = page.data.len(), "fetched line item page");

            if page.has_more && page.data.is_empty() {
                return Err(ProviderError::Decode(format!(
                    "empty line item page for {session_id}"
                )));
            }
            line_items.data.extend(page.data);
            line_items.has_more = page.has_more;
        }
        Ok(())
    }
}

async fn decode_response<T: DeserializeOwned>(
    response: Response,
    resource: &str,
) -> Result<T, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let envelope = serde_json::from_str::<ErrorEnvelope>(&body).ok();
    let code = envelope.as_ref().and_then(|e| e.error.code.clone());
    let message = envelope
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

    if status == StatusCode::NOT_FOUND || code.as_deref() == Some("resource_missing") {
        debug!(resource, "stripe resource missing");
        return Err(ProviderError::NotFound(resource.to_string()));
    }

    warn!(status = status.as_u16(), code = ?code, message = %message, "stripe request rejected");
    Err(ProviderError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self))]
    async fn list_active_prices(&self, limit: u32) -> Result<Vec<Price>, ProviderError> {
        let request = self.get("prices").query(&[
            ("active", "true".to_string()),
            ("limit", limit.clamp(1, 100).to_string()),
            ("expand[]", "data.product".to_string()),
        ]);
        let list: List<Price> = self.send(request, "prices").await?;
        if list.has_more {
            debug!(limit, "more active prices exist than the catalog page holds");
        }
        Ok(list.data)
    }

    #[instrument(skip(self))]
    async fn retrieve_price(&self, price_id: &str) -> Result<Price, ProviderError> {
        if !is_valid_provider_id(price_id) {
            return Err(ProviderError::NotFound(price_id.to_string()));
        }
        let request = self
            .get(&format!("prices/{price_id}"))
            .query(&[("expand[]", "product")]);
        self.send(request, price_id).await
    }

    #[instrument(skip(self, request), fields(lines = request.line_items.len(), mode = request.mode.as_str()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let builder = self
            .http
            .post(self.url("checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&request.to_form());
        self.send(builder, "checkout_session").await
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        if !is_valid_provider_id(session_id) {
            return Err(ProviderError::NotFound(session_id.to_string()));
        }
        let request = self
            .get(&format!("checkout/sessions/{session_id}"))
            .query(&[("expand[]", "line_items.data.price")]);
        let mut session: CheckoutSession = self.send(request, session_id).await?;

        if let Some(line_items) = session.line_items.as_mut() {
            if line_items.has_more {
                self.fetch_remaining_line_items(session_id, line_items)
                    .await?;
            }
        }
        Ok(session)
    }
}

