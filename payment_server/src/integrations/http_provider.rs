use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use payment_engine::{
    catalog::PaymentSystem,
    traits::{PaymentProvider, ProviderError, ProviderPaymentRequest, ProviderPaymentResponse},
};
use reqwest::Client;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`PaymentProvider`] that POSTs the payment request as JSON to the payment system's URL and expects
/// `{redirect_url, transaction_id}` back.
///
/// A 4xx answer means the system refused the payment. Anything else that is not a success means it could not be
/// reached.
#[derive(Clone)]
pub struct HttpPaymentProvider {
    client: Arc<Client>,
}

impl HttpPaymentProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let client =
            Client::builder().timeout(PROVIDER_TIMEOUT).build().map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self { client: Arc::new(client) })
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_payment(
        &self,
        system: &PaymentSystem,
        request: &ProviderPaymentRequest,
    ) -> Result<ProviderPaymentResponse, ProviderError> {
        let url = system
            .url
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable(format!("payment system {} has no URL configured", system.id)))?;
        debug!("💳️ Creating payment for order {} at {}", request.order_uuid, system.name);
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            response.json::<ProviderPaymentResponse>().await.map_err(|e| ProviderError::Unavailable(e.to_string()))
        } else if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            Err(ProviderError::Rejected(format!("{} ({status}): {text}", system.name)))
        } else {
            Err(ProviderError::Unavailable(format!("{} answered {status}", system.name)))
        }
    }
}
