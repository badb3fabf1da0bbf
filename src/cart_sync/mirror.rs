use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::CartSyncError;
use crate::models::CartLine;

/// Quiet period before a cart edit is mirrored to the server.
pub const MIRROR_DEBOUNCE: Duration = Duration::from_millis(150);

/// Destination of the server-visible cart copy.
#[async_trait]
pub trait CartMirror: Send + Sync {
    async fn push(&self, lines: Vec<CartLine>) -> Result<(), CartSyncError>;
}

/// Posts `{cart}` to the storefront's `/api/cart-cookie` endpoint. The client
/// keeps the returned cookie for later requests.
#[derive(Clone)]
pub struct HttpCartMirror {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCartMirror {
    pub fn new(base_url: &str) -> Result<Self, CartSyncError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CartSyncError::Mirror(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/cart-cookie", base_url.trim_end_matches('/')),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl CartMirror for HttpCartMirror {
    async fn push(&self, lines: Vec<CartLine>) -> Result<(), CartSyncError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "cart": lines }))
            .send()
            .await
            .map_err(|e| CartSyncError::Mirror(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CartSyncError::Mirror(format!(
                "cart mirror answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

struct Pending {
    generation: u64,
    lines: Vec<CartLine>,
    handle: JoinHandle<()>,
}

struct InFlight {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<Pending>,
    in_flight: Vec<InFlight>,
}

impl Slot {
    /// Claims the pending lines for the timer task of `generation`. Its handle
    /// moves to `in_flight` so a later flush can wait for the write.
    fn take_if_current(&mut self, generation: u64) -> Option<Vec<CartLine>> {
        match self.pending.take() {
            Some(pending) if pending.generation == generation => {
                self.in_flight.push(InFlight {
                    generation,
                    handle: pending.handle,
                });
                Some(pending.lines)
            }
            other => {
                self.pending = other;
                None
            }
        }
    }

    fn finish(&mut self, generation: u64) {
        self.in_flight.retain(|write| write.generation != generation);
    }
}

/// Coalesces rapid cart edits into one mirror write.
///
/// Each [`schedule`](Self::schedule) aborts the write it supersedes and starts
/// a new delayed one. [`flush`](Self::flush) waits for writes already on the
/// wire and sends whatever is pending right away. Must be used inside a tokio
/// runtime.
pub struct DebouncedMirror {
    mirror: Arc<dyn CartMirror>,
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

fn lock(slot: &Mutex<Slot>) -> std::sync::MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DebouncedMirror {
    pub fn new(mirror: Arc<dyn CartMirror>) -> Self {
        Self::with_delay(mirror, MIRROR_DEBOUNCE)
    }

    pub fn with_delay(mirror: Arc<dyn CartMirror>, delay: Duration) -> Self {
        Self {
            mirror,
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// True while a write is waiting for its timer or still being sent.
    pub fn has_pending(&self) -> bool {
        let slot = lock(&self.slot);
        slot.pending.is_some() || !slot.in_flight.is_empty()
    }

    pub fn schedule(&self, lines: Vec<CartLine>) {
        let mut slot = lock(&self.slot);
        if let Some(superseded) = slot.pending.take() {
            superseded.handle.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;

        let shared = Arc::clone(&self.slot);
        let mirror = Arc::clone(&self.mirror);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(lines) = lock(&shared).take_if_current(generation) else {
                return;
            };
            debug!(lines = lines.len(), "mirroring cart");
            if let Err(err) = mirror.push(lines).await {
                warn!(error = %err, "cart mirror write failed");
            }
            lock(&shared).finish(generation);
        });

        slot.pending = Some(Pending {
            generation,
            lines,
            handle,
        });
    }

    /// Waits for in-flight writes, then sends the pending cart without
    /// waiting for the timer. On return the server has seen the latest cart.
    pub async fn flush(&self) -> Result<(), CartSyncError> {
        let (in_flight, pending) = {
            let mut slot = lock(&self.slot);
            (std::mem::take(&mut slot.in_flight), slot.pending.take())
        };

        for write in in_flight {
            if let Err(err) = write.handle.await {
                if !err.is_cancelled() {
                    return Err(CartSyncError::Mirror(err.to_string()));
                }
            }
        }

        match pending {
            Some(pending) => {
                pending.handle.abort();
                self.mirror.push(pending.lines).await
            }
            None => Ok(()),
        }
    }
}

impl Drop for DebouncedMirror {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.slot).pending.take() {
            pending.handle.abort();
        }
    }
}
