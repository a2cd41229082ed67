use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use payment_engine::traits::{PushError, PushGateway};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
};
use serde_json::{json, Value};

use crate::config::PushConfig;

/// A [`PushGateway`] for an HTTP publish API. Each message is POSTed as `{method: "publish", params: {channel, data}}`.
#[derive(Clone)]
pub struct HttpPushGateway {
    url: String,
    client: Arc<Client>,
}

impl HttpPushGateway {
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let mut headers = HeaderMap::with_capacity(1);
        if !config.api_key.reveal().is_empty() {
            let val = HeaderValue::from_str(&format!("apikey {}", config.api_key.reveal()))
                .map_err(|e| PushError(e.to_string()))?;
            headers.insert(AUTHORIZATION, val);
        }
        let client = Client::builder().default_headers(headers).build().map_err(|e| PushError(e.to_string()))?;
        Ok(Self { url: config.url.clone(), client: Arc::new(client) })
    }

    pub fn request_body(channel: &str, message: &Value) -> Value {
        json!({ "method": "publish", "params": { "channel": channel, "data": message } })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn publish(&self, channel: &str, message: &Value) -> Result<(), PushError> {
        let body = Self::request_body(channel, message);
        let response =
            self.client.post(&self.url).json(&body).send().await.map_err(|e| PushError(e.to_string()))?;
        if response.status().is_success() {
            trace!("📡️ Pushed message to {channel}");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            Err(PushError(format!("push gateway answered {status}: {text}")))
        }
    }
}

/// Used when no push gateway is configured. Messages are written to the log instead.
#[derive(Clone, Debug, Default)]
pub struct LogOnlyPush;

#[async_trait]
impl PushGateway for LogOnlyPush {
    async fn publish(&self, channel: &str, message: &Value) -> Result<(), PushError> {
        info!("📡️ [{channel}] {message}");
        Ok(())
    }
}
