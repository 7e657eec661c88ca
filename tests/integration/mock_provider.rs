//! Mock provider for integration testing.
//!
//! A deterministic `PriceProvider` whose answer, latency and failure mode
//! are controllable from test code, and which records how it was called.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use goldwatch::providers::{FetchError, PriceProvider};
use goldwatch::types::{Quantity, QuantityKind};

/// Test-side handle on a `MockProvider`.
#[derive(Clone)]
pub struct MockControl {
    value: Arc<Mutex<Option<f64>>>,
    calls: Arc<AtomicU32>,
    max_active: Arc<AtomicU32>,
}

impl MockControl {
    /// Answer with `value` from now on (`None` fails as absent).
    pub fn set(&self, value: Option<f64>) {
        *self.value.lock().unwrap() = value;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were ever outstanding at once.
    pub fn max_active(&self) -> u32 {
        self.max_active.load(Ordering::SeqCst)
    }
}

pub struct MockProvider {
    id: &'static str,
    kind: QuantityKind,
    delay: Option<Duration>,
    value: Arc<Mutex<Option<f64>>>,
    calls: Arc<AtomicU32>,
    active: Arc<AtomicU32>,
    max_active: Arc<AtomicU32>,
}

impl MockProvider {
    pub fn new(id: &'static str, kind: QuantityKind, value: Option<f64>) -> (Self, MockControl) {
        let value = Arc::new(Mutex::new(value));
        let calls = Arc::new(AtomicU32::new(0));
        let max_active = Arc::new(AtomicU32::new(0));
        let control = MockControl {
            value: value.clone(),
            calls: calls.clone(),
            max_active: max_active.clone(),
        };
        let provider = Self {
            id,
            kind,
            delay: None,
            value,
            calls,
            active: Arc::new(AtomicU32::new(0)),
            max_active,
        };
        (provider, control)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn boxed(self) -> Box<dyn PriceProvider> {
        Box::new(self)
    }
}

#[async_trait]
impl PriceProvider for MockProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn label(&self) -> &str {
        self.id
    }

    fn kind(&self) -> QuantityKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn try_fetch(&self) -> Result<Quantity, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let value = *self.value.lock().unwrap();

        self.active.fetch_sub(1, Ordering::SeqCst);
        value
            .and_then(|v| Quantity::positive(v, self.id))
            .ok_or_else(|| FetchError::absent(self.id))
    }
}
