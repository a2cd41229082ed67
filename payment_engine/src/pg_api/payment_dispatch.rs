use chrono::Utc;
use log::*;

use crate::{
    catalog::{CostQuery, Merchant, PaymentMethod, PaymentSystem},
    db_types::{Order, PaymentMethodType},
    order_status::OrderEvent,
    pg_api::{
        errors::{OrderError, RequiredField},
        order_objects::{PaymentCreateRequest, PaymentCreateResponse},
        OrderFlowApi,
    },
    traits::{OrderManagement, ProviderPaymentRequest},
};

const BANK_CARD_FIELDS: [RequiredField; 5] = [
    RequiredField::BankCardNumber,
    RequiredField::BankCardCvv,
    RequiredField::BankCardExpireMonth,
    RequiredField::BankCardExpireYear,
    RequiredField::BankCardHolder,
];

fn required_fields(method_type: PaymentMethodType) -> &'static [RequiredField] {
    match method_type {
        PaymentMethodType::BankCard => &BANK_CARD_FIELDS,
        PaymentMethodType::Ewallet => &[RequiredField::EwalletIdentifier],
        PaymentMethodType::Crypto => &[RequiredField::CryptoAddress],
    }
}

/// Returns the first missing field, in the order the payment form lists them.
pub fn check_required_fields(method_type: PaymentMethodType, request: &PaymentCreateRequest) -> Result<(), OrderError> {
    match required_fields(method_type).iter().find(|f| request.field(f.field_name()).is_none()) {
        Some(field) => Err(OrderError::MissingField(*field)),
        None => Ok(()),
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Takes the payer's instrument data for an existing order and asks the bound payment provider to create the
    /// payment.
    ///
    /// Everything that was checked at order creation and may have changed since is checked again. The order must
    /// still be payable and must not have been re-created. The method and its payment system must still be active,
    /// and a billing address in another country must not be banned. A provider failure moves the order to `PaymentSystemRejectOnCreate`.
    pub async fn process_payment(&self, request: PaymentCreateRequest) -> Result<PaymentCreateResponse, OrderError> {
        let uuid = request.order_uuid.clone();
        trace!("💳️ Payment form submitted for order {uuid}");
        let order = self.fetch_order(&uuid).await?;
        if let Some(replacement) = &order.superseded_by {
            debug!("💳️ Order {uuid} was re-created as {replacement} and cannot be paid");
            return Err(OrderError::OrderSuperseded(replacement.clone()));
        }
        if order.status.is_ended() {
            debug!("💳️ Order {uuid} is {} and cannot be paid", order.status);
            return Err(OrderError::OrderInEndedState(order.status));
        }
        if order.is_form_expired(Utc::now()) {
            debug!("💳️ The payment form for order {uuid} expired at {}", order.form_expires_at);
            return Err(OrderError::FormExpired);
        }
        let (method, system) = self.payable_method(&request.payment_method_id, &order.currency).await?;
        check_required_fields(method.method_type, &request)?;
        self.check_billing_country(&order, &request).await?;
        let merchant = self
            .services
            .catalog
            .fetch_merchant(&order.project.merchant_id)
            .await?
            .ok_or_else(|| OrderError::Internal(format!("merchant {} has disappeared", order.project.merchant_id)))?;
        let fee = self.resolve_fee(&order, &request, &method, &merchant).await?;

        let provider = self.services.providers.get(&system.handler)?;
        let provider_request = ProviderPaymentRequest {
            order_uuid: uuid.to_string(),
            amount: order.total_amount,
            currency: order.currency.clone(),
            payment_method_id: method.id.clone(),
            terminal_id: method.terminal_id.clone(),
            fields: request.fields.clone(),
            url_success: order.project.url_success.clone(),
            url_fail: order.project.url_fail.clone(),
        };
        match provider.create_payment(&system, &provider_request).await {
            Ok(response) => {
                let change = self
                    .transition(&order, OrderEvent::PaymentCreated)?
                    .with_payment_method(method.snapshot(&system))
                    .with_billing_address(request.billing_address.clone())
                    .with_transaction(response.transaction_id.clone(), fee);
                let order = self.commit(change).await?;
                info!("💳️ Payment created for order {uuid} with {} via {}", method.name, system.name);
                Ok(PaymentCreateResponse {
                    order_uuid: order.uuid.clone(),
                    redirect_url: response.redirect_url,
                    status: order.public_status(),
                })
            },
            Err(e) => {
                warn!("💳️ {} refused the payment for order {uuid}: {e}", system.name);
                let change = self
                    .transition(&order, OrderEvent::PaymentCreateRejected)?
                    .with_payment_method(method.snapshot(&system))
                    .with_billing_address(request.billing_address.clone());
                if let Err(commit_err) = self.commit(change).await {
                    error!("💳️ Could not record the rejected payment for order {uuid}: {commit_err}");
                }
                Err(e.into())
            },
        }
    }

    async fn payable_method(&self, method_id: &str, currency: &str) -> Result<(PaymentMethod, PaymentSystem), OrderError> {
        let catalog = &self.services.catalog;
        let method = catalog.fetch_payment_method(method_id).await?.ok_or(OrderError::PaymentMethodNotFound)?;
        if !method.active {
            return Err(OrderError::PaymentMethodInactive);
        }
        if !method.supports_currency(currency) {
            return Err(OrderError::PaymentMethodNotFound);
        }
        let system = catalog
            .fetch_payment_system(&method.payment_system_id)
            .await?
            .filter(|s| s.active)
            .ok_or(OrderError::PaymentSystemInactive)?;
        Ok((method, system))
    }

    async fn check_billing_country(&self, order: &Order, request: &PaymentCreateRequest) -> Result<(), OrderError> {
        let billing_country = request.billing_country();
        if order.user_address_data_required && billing_country.is_none() {
            return Err(OrderError::BillingCountryRequired);
        }
        let Some(country) = billing_country else {
            return Ok(());
        };
        if order.user.country.as_deref() == Some(country) && !order.user_address_data_required {
            return Ok(());
        }
        let policy = self.services.catalog.country_policy(country).await?.unwrap_or_default();
        if !policy.payments_allowed {
            debug!("💳️ Payments from billing country {country} are not allowed (order {})", order.uuid);
            return Err(OrderError::CountryPaymentsNotAllowed);
        }
        Ok(())
    }

    async fn resolve_fee(
        &self,
        order: &Order,
        request: &PaymentCreateRequest,
        method: &PaymentMethod,
        merchant: &Merchant,
    ) -> Result<pg_common::Amount, OrderError> {
        let region = request
            .billing_country()
            .map(String::from)
            .or_else(|| order.user.region.clone())
            .or_else(|| order.user.country.clone())
            .ok_or(OrderError::PayerRegionUnknown)?;
        let query = CostQuery {
            payment_method_id: method.id.clone(),
            region,
            currency: order.currency.clone(),
            mcc: merchant.mcc.clone(),
            operating_company: merchant.operating_company.clone(),
        };
        let schedule = self.services.costs.find_schedule(&query).await?.ok_or_else(|| {
            debug!("💳️ No cost schedule for {} in {} ({})", query.payment_method_id, query.region, query.currency);
            OrderError::CostScheduleNotFound
        })?;
        Ok(schedule.fee_for(order.total_amount))
    }
}
