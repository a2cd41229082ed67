use chrono::Utc;
use log::*;

use crate::{
    db_types::{AccountingEntryType, Order, OrderUuid},
    helpers::verify_hmac,
    pg_api::{
        errors::OrderError,
        order_objects::{CallbackOutcome, CallbackPayload, CallbackResult},
        OrderFlowApi,
    },
    traits::{OrderManagement, PaymentGatewayError},
};

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Applies a payment provider's callback to an order.
    ///
    /// `raw_body` must be the exact bytes the provider sent, since `signature` is the hex HMAC-SHA512 of those bytes
    /// followed by the payment method's callback secret. A callback that fails authentication, or whose amount or
    /// currency does not match the order, changes nothing.
    ///
    /// Providers retry callbacks, so delivering the same outcome twice is not an error: the second delivery returns
    /// [`CallbackResult::AlreadyProcessed`] and writes nothing. This also holds when two deliveries race, because the
    /// status update is guarded and the accounting entry is unique per order.
    pub async fn process_callback(
        &self,
        uuid: &OrderUuid,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<CallbackResult, OrderError> {
        trace!("📞️ Callback received for order {uuid}");
        let order = self.fetch_order(uuid).await?;
        let secret = order
            .payment_method
            .as_ref()
            .map(|m| m.callback_secret.clone())
            .ok_or(OrderError::OrderPaymentMethodMissing)?;
        if let Err(e) = verify_hmac(raw_body, &secret, signature) {
            warn!("📞️ Rejected callback for order {uuid}: {e}");
            return Err(OrderError::InvalidCallbackSignature);
        }
        let payload = serde_json::from_slice::<CallbackPayload>(raw_body)
            .map_err(|e| OrderError::CallbackPayloadInvalid(e.to_string()))?;
        debug!("📞️ Callback for order {uuid} reports {:?}", payload.outcome);

        if payload.outcome.is_consistent_with(order.status) {
            info!("📞️ Order {uuid} is already {}. Acknowledging repeated callback.", order.status);
            return Ok(CallbackResult::AlreadyProcessed(order));
        }
        let change = self.transition(&order, payload.outcome.event())?;
        check_amount(&order, &payload)?;

        let mut change = change
            .with_requisites(payload.requisites.normalise())
            .with_transaction(payload.transaction_id.clone().or_else(|| order.provider_transaction_id.clone()), order.fee);
        if let Some(cancellation) = payload.cancellation() {
            change = change.with_cancellation(cancellation);
        }
        if payload.outcome == CallbackOutcome::Completed {
            change = change.paid_at(Utc::now()).with_accounting_entry(AccountingEntryType::Payment);
        }

        let notify = change.notification_flag.is_some();
        let updated = match self.db.apply_status_change(change).await {
            Ok(updated) => updated,
            Err(PaymentGatewayError::StatusChanged { .. }) | Err(PaymentGatewayError::DuplicateAccountingEntry(_)) => {
                return self.resolve_lost_race(uuid, payload.outcome).await;
            },
            Err(e) => return Err(e.into()),
        };
        if notify {
            self.notifier.enqueue(updated.clone());
        }
        info!("📞️ Order {uuid} moved from {} to {}", order.status, updated.status);
        if payload.outcome == CallbackOutcome::Completed {
            self.call_order_paid_hook(&updated).await;
        } else {
            self.call_order_declined_hook(&updated).await;
        }
        Ok(CallbackResult::Processed(updated))
    }

    /// Another writer got to the order first. If it applied the same outcome, this callback is a repeat.
    async fn resolve_lost_race(&self, uuid: &OrderUuid, outcome: CallbackOutcome) -> Result<CallbackResult, OrderError> {
        let current = self.fetch_order(uuid).await?;
        if outcome.is_consistent_with(current.status) {
            info!("📞️ A concurrent callback already moved order {uuid} to {}", current.status);
            return Ok(CallbackResult::AlreadyProcessed(current));
        }
        warn!("📞️ Order {uuid} changed to {} while a {outcome:?} callback was being applied", current.status);
        current.status.apply(outcome.event())?;
        Err(OrderError::Storage(format!("order {uuid} was modified concurrently, the callback can be retried")))
    }
}

fn check_amount(order: &Order, payload: &CallbackPayload) -> Result<(), OrderError> {
    if !payload.currency.eq_ignore_ascii_case(&order.currency) {
        return Err(OrderError::CallbackCurrencyMismatch {
            expected: order.currency.clone(),
            actual: payload.currency.clone(),
        });
    }
    if payload.amount != order.total_amount {
        return Err(OrderError::CallbackAmountMismatch { expected: order.total_amount, actual: payload.amount });
    }
    Ok(())
}
