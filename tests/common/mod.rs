#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use storefront_api::{
    app_router,
    config::AppConfig,
    provider::{
        CheckoutSession, CheckoutSessionRequest, PaymentProvider, Price, ProviderError,
    },
    AppState,
};
use tower::ServiceExt;

pub const ORIGIN: &str = "https://shop.test";
pub const ENTITLEMENT_SECRET: &str = "t3st-Entitlement-Signing-Key-9QxZ-vWk7";
pub const ALLOWED: &str = "price_course,price_sticker,price_sub,price_eur,price_archived";

/// Price JSON in the shape the provider returns with the product expanded.
pub fn price_json(id: &str, unit_amount: i64, currency: &str) -> Value {
    json!({
        "id": id,
        "object": "price",
        "active": true,
        "currency": currency,
        "unit_amount": unit_amount,
        "product": {
            "id": format!("prod_{id}"),
            "name": format!("Product {id}"),
            "images": [format!("https://img.test/{id}.png")]
        }
    })
}

pub fn price(id: &str, unit_amount: i64, currency: &str) -> Price {
    serde_json::from_value(price_json(id, unit_amount, currency)).expect("price fixture")
}

pub fn session(id: &str, status: &str, email: Option<&str>, prices: &[&str]) -> CheckoutSession {
    let line_items: Vec<Value> = prices
        .iter()
        .map(|p| json!({ "id": format!("li_{p}"), "quantity": 1, "price": price_json(p, 100, "usd") }))
        .collect();
    serde_json::from_value(json!({
        "id": id,
        "object": "checkout.session",
        "payment_status": status,
        "mode": "payment",
        "customer_details": { "email": email },
        "line_items": { "object": "list", "data": line_items, "has_more": false }
    }))
    .expect("session fixture")
}

#[derive(Default)]
struct FakeState {
    prices: HashMap<String, Price>,
    sessions: HashMap<String, CheckoutSession>,
    failing: HashSet<String>,
    list_fails: bool,
    created: Vec<CheckoutSessionRequest>,
    price_lookups: Vec<String>,
    created_count: usize,
}

/// In-memory payment provider that records what the app asked of it.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The storefront fixture: an allowlisted catalog plus one hidden and one archived price.
    pub fn storefront() -> Self {
        let provider = Self::new();
        provider.add_price(price("price_course", 4900, "usd"));
        provider.add_price(price("price_sticker", 300, "usd"));
        let mut sub = price("price_sub", 900, "usd");
        sub.recurring = serde_json::from_value(json!({ "interval": "month" })).ok();
        provider.add_price(sub);
        provider.add_price(price("price_eur", 1000, "eur"));
        provider.add_price(price("price_hidden", 100, "usd"));
        let mut archived = price("price_archived", 500, "usd");
        archived.active = false;
        provider.add_price(archived);

        provider.add_session(session(
            "cs_paid",
            "paid",
            Some("buyer@example.com"),
            &["price_course", "price_hidden"],
        ));
        provider.add_session(session("cs_paid_other", "paid", None, &["price_hidden"]));
        provider.add_session(session("cs_unpaid", "unpaid", None, &["price_course"]));
        provider
    }

    pub fn add_price(&self, price: Price) {
        self.lock().prices.insert(price.id.clone(), price);
    }

    pub fn add_session(&self, session: CheckoutSession) {
        self.lock().sessions.insert(session.id.clone(), session);
    }

    /// Lookups for this id fail with a transport error.
    pub fn fail_on(&self, id: &str) {
        self.lock().failing.insert(id.to_string());
    }

    pub fn fail_listing(&self) {
        self.lock().list_fails = true;
    }

    pub fn created_sessions(&self) -> Vec<CheckoutSessionRequest> {
        self.lock().created.clone()
    }

    pub fn price_lookups(&self) -> Vec<String> {
        self.lock().price_lookups.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake provider lock")
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn list_active_prices(&self, limit: u32) -> Result<Vec<Price>, ProviderError> {
        let state = self.lock();
        if state.list_fails {
            return Err(ProviderError::Transport("connection reset".into()));
        }
        let mut prices: Vec<Price> = state.prices.values().filter(|p| p.active).cloned().collect();
        prices.sort_by(|a, b| a.id.cmp(&b.id));
        prices.truncate(limit as usize);
        Ok(prices)
    }

    async fn retrieve_price(&self, price_id: &str) -> Result<Price, ProviderError> {
        let mut state = self.lock();
        state.price_lookups.push(price_id.to_string());
        if state.failing.contains(price_id) {
            return Err(ProviderError::Transport("timed out".into()));
        }
        state
            .prices
            .get(price_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(price_id.to_string()))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let mut state = self.lock();
        if state.failing.contains("checkout_session") {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "No such price".into(),
            });
        }
        state.created_count += 1;
        let id = format!("cs_new_{}", state.created_count);
        state.created.push(request.clone());
        serde_json::from_value(json!({
            "id": id,
            "url": format!("https://checkout.stripe.test/pay/{id}"),
            "payment_status": "unpaid",
            "mode": request.mode.as_str(),
        }))
        .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let state = self.lock();
        if state.failing.contains(session_id) {
            return Err(ProviderError::Transport("timed out".into()));
        }
        state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(session_id.to_string()))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::new(
        ORIGIN.to_string(),
        "sk_test_storefront".to_string(),
        ENTITLEMENT_SECRET.to_string(),
        ALLOWED.to_string(),
        "development".to_string(),
    )
}

/// Router under test backed by a [`FakeProvider`].
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: FakeProvider,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_provider(FakeProvider::storefront())
    }

    pub fn with_provider(provider: FakeProvider) -> Self {
        Self::with_state(AppState::new(test_config(), Arc::new(provider.clone())), provider)
    }

    pub fn with_state(state: AppState, provider: FakeProvider) -> Self {
        Self {
            router: app_router(state.clone()),
            state,
            provider,
        }
    }

    /// Send a request with an optional raw body and cookie header.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
        cookie: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(raw) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(raw)
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.request(Method::GET, uri, None, cookie).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response {
        self.request(Method::POST, uri, Some(body.to_string()), cookie)
            .await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// `name=value` of the named `Set-Cookie` header, ready to send back.
pub fn cookie_pair(response: &Response, name: &str) -> Option<String> {
    set_cookie(response, name).map(|raw| {
        raw.split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    })
}

/// Full `Set-Cookie` header for the named cookie.
pub fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|raw| raw.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub fn location(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
