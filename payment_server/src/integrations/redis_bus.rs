use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use payment_engine::traits::{BusError, Headers, MessageBus};
use redis::{AsyncCommands, Client};
use serde_json::{json, Value};

/// A [`MessageBus`] over Redis `PUBLISH`.
///
/// Each message is a JSON envelope `{topic, headers, payload}` published on the channel named after the topic. The
/// reply to `PUBLISH` is the broker's acknowledgement; if it does not arrive within the publish timeout the publish
/// fails with [`BusError::Timeout`].
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    timeout: Duration,
}

impl RedisBus {
    pub fn connect(redis_url: &str, timeout: Duration) -> Result<Self, BusError> {
        let client = Client::open(redis_url).map_err(|e| BusError::PublishFailed(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn envelope(topic: &str, payload: &Value, headers: &Headers) -> Value {
        json!({ "topic": topic, "headers": headers, "payload": payload })
    }

    async fn publish_envelope(&self, topic: &str, message: String) -> Result<i64, BusError> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))?;
        connection.publish(topic, message).await.map_err(|e| BusError::PublishFailed(e.to_string()))
    }

    /// Publishes in the background and calls `on_complete` with the outcome. The same publish timeout applies.
    pub fn publish_async<F>(self: &Arc<Self>, topic: String, payload: Value, headers: Headers, on_complete: F)
    where F: FnOnce(Result<(), BusError>) + Send + 'static {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let result = bus.publish(&topic, &payload, &headers).await;
            on_complete(result);
        });
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &str, payload: &Value, headers: &Headers) -> Result<(), BusError> {
        let message = serde_json::to_string(&Self::envelope(topic, payload, headers))
            .map_err(|e| BusError::Serialization(e.to_string()))?;
        match tokio::time::timeout(self.timeout, self.publish_envelope(topic, message)).await {
            Ok(Ok(receivers)) => {
                trace!("📬️ Published to {topic}. {receivers} subscribers received it");
                Ok(())
            },
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("📬️ Redis did not acknowledge a publish to {topic} within {:?}", self.timeout);
                Err(BusError::Timeout)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_wraps_payload_and_headers() {
        let mut headers = Headers::new();
        headers.insert("x-order-uuid".into(), "abc".into());
        let envelope = RedisBus::envelope("order.status_changed", &json!({"status": "processed"}), &headers);
        assert_eq!(envelope["topic"], "order.status_changed");
        assert_eq!(envelope["headers"]["x-order-uuid"], "abc");
        assert_eq!(envelope["payload"]["status"], "processed");
    }

    #[tokio::test]
    async fn async_publish_reports_failures() {
        // Nothing listens on port 1
        let bus = Arc::new(RedisBus::connect("redis://127.0.0.1:1", Duration::from_secs(2)).unwrap());
        let (tx, rx) = tokio::sync::oneshot::channel();
        bus.publish_async("order.status_changed".into(), json!({}), Headers::new(), move |result| {
            let _ = tx.send(result);
        });
        let result = rx.await.expect("the completion callback was not called");
        assert!(result.is_err());
    }

    #[test]
    fn bad_urls_are_rejected() {
        assert!(RedisBus::connect("not a url", Duration::from_secs(1)).is_err());
    }
}
