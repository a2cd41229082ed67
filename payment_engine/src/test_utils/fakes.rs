//! In-memory stand-ins for the external collaborators.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    catalog::PaymentSystem,
    traits::{
        BusError,
        Headers,
        MessageBus,
        NotificationStore,
        PaymentGatewayError,
        PaymentProvider,
        ProviderError,
        ProviderPaymentRequest,
        ProviderPaymentResponse,
        PushError,
        PushGateway,
        StoredNotification,
    },
};

#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    entries: Mutex<Vec<StoredNotification>>,
}

impl MemoryNotificationStore {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn load_notifications(&self) -> Result<Vec<StoredNotification>, PaymentGatewayError> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn save_notifications(&self, notifications: &[StoredNotification]) -> Result<(), PaymentGatewayError> {
        self.entries.lock().unwrap().extend_from_slice(notifications);
        Ok(())
    }

    async fn clear_notifications(&self) -> Result<u64, PaymentGatewayError> {
        let mut entries = self.entries.lock().unwrap();
        let n = entries.len() as u64;
        entries.clear();
        Ok(n)
    }

    async fn replace_notifications(&self, notifications: &[StoredNotification]) -> Result<(), PaymentGatewayError> {
        *self.entries.lock().unwrap() = notifications.to_vec();
        Ok(())
    }
}

/// A message bus that records what it is given. Flip [`RecordingBus::set_down`] to simulate an outage.
#[derive(Debug, Default)]
pub struct RecordingBus {
    down: AtomicBool,
    published: Mutex<Vec<(String, Value, Headers)>>,
}

impl RecordingBus {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Value, Headers)> {
        self.published.lock().unwrap().clone()
    }

    /// The value of `header` for every published message, in publish order.
    pub fn header_values(&self, header: &str) -> Vec<String> {
        self.published.lock().unwrap().iter().filter_map(|(_, _, h)| h.get(header).cloned()).collect()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: &Value, headers: &Headers) -> Result<(), BusError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(BusError::PublishFailed("the broker is down".into()));
        }
        self.published.lock().unwrap().push((topic.to_string(), payload.clone(), headers.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPush {
    messages: Mutex<Vec<(String, Value)>>,
}

impl RecordingPush {
    pub fn messages(&self) -> Vec<(String, Value)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingPush {
    async fn publish(&self, channel: &str, message: &Value) -> Result<(), PushError> {
        self.messages.lock().unwrap().push((channel.to_string(), message.clone()));
        Ok(())
    }
}

/// A payment provider that accepts every payment, unless told to refuse.
#[derive(Debug, Default)]
pub struct FakeProvider {
    refuse: AtomicBool,
    requests: Mutex<Vec<ProviderPaymentRequest>>,
}

impl FakeProvider {
    pub fn refusing() -> Self {
        let provider = Self::default();
        provider.refuse.store(true, Ordering::SeqCst);
        provider
    }

    pub fn requests(&self) -> Vec<ProviderPaymentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_payment(
        &self,
        system: &PaymentSystem,
        request: &ProviderPaymentRequest,
    ) -> Result<ProviderPaymentResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected(format!("{} refused the payment", system.name)));
        }
        Ok(ProviderPaymentResponse {
            redirect_url: format!("https://pay.example/{}/3ds", request.order_uuid),
            transaction_id: Some(format!("tx-{}", request.order_uuid)),
        })
    }
}
