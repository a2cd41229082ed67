use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{AccountingEntryType, NewOrder, Order, OrderCancellation, OrderType, OrderUuid},
    events::{EventProducers, OrderCreatedEvent, OrderDeclinedEvent, OrderPaidEvent},
    helpers::verify_hmac,
    notifications::NotificationSender,
    order_status::OrderEvent,
    pg_api::{
        errors::OrderError,
        order_objects::{OrderCreateRequest, OrderView, RequestSignature},
        services::{EngineConfig, EngineServices},
    },
    traits::{OrderManagement, StatusChange},
    validation::OrderPipeline,
};

/// `OrderFlowApi` is the primary API for the order lifecycle: order creation, payment dispatch, provider callbacks
/// and the merchant-side transitions that follow a payment.
///
/// Every status change goes through the transition table in [`crate::db_types::OrderStatus::apply`] and is written
/// with a guarded update, so concurrent writers cannot move an order backwards. Merchant notifications are queued
/// only after the change has been committed.
pub struct OrderFlowApi<B> {
    pub(super) db: B,
    pub(super) services: EngineServices,
    pub(super) notifier: NotificationSender,
    pub(super) producers: EventProducers,
    pub(super) config: EngineConfig,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(
        db: B,
        services: EngineServices,
        notifier: NotificationSender,
        producers: EventProducers,
        config: EngineConfig,
    ) -> Self {
        Self { db, services, notifier, producers, config }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Validates an order request and stores the new order.
    ///
    /// The request runs through the full validation pipeline (see [`crate::validation`]). The first failing stage
    /// determines the error. Nothing is stored unless every stage passes.
    pub async fn create_order(
        &self,
        request: OrderCreateRequest,
        signature: Option<RequestSignature>,
    ) -> Result<Order, OrderError> {
        let project_id = request.project_id.clone();
        trace!("🧾️ New order request for project {project_id}");
        let pipeline = OrderPipeline::new(&self.db, &self.services, &self.config);
        let order = pipeline.run(request, signature).await.map_err(|e| {
            debug!("🧾️ Order request for project {project_id} rejected: {e}");
            e
        })?;
        self.call_order_created_hook(&order).await;
        Ok(order)
    }

    pub async fn fetch_order(&self, uuid: &OrderUuid) -> Result<Order, OrderError> {
        self.db.fetch_order_by_uuid(uuid).await?.ok_or_else(|| OrderError::OrderNotFound(uuid.clone()))
    }

    /// The public view of an order. The internal id is never exposed.
    pub async fn order_by_uuid(&self, uuid: &OrderUuid) -> Result<OrderView, OrderError> {
        let order = self.fetch_order(uuid).await?;
        Ok(OrderView::from(&order))
    }

    /// Replaces an order whose payment attempt failed (or has not finished) with a fresh copy.
    ///
    /// The copy has a new public token, status `New`, no payment method binding and a new form deadline. The old
    /// order is marked as superseded in the same transaction, which frees its project order id for the copy.
    pub async fn recreate_order(&self, uuid: &OrderUuid) -> Result<Order, OrderError> {
        let order = self.fetch_order(uuid).await?;
        if order.superseded_by.is_some() {
            return Err(OrderError::OrderAlreadyRecreated(order.uuid));
        }
        if !order.status.can_be_recreated() {
            debug!("🧾️ Order {uuid} is {} and cannot be re-created", order.status);
            return Err(OrderError::OrderCantBeRecreated(order.status));
        }
        let replacement = NewOrder::recreate_from(&order, self.form_deadline());
        let new_order = self.db.recreate_order(&order, replacement).await?;
        info!("🧾️ Order {uuid} has been re-created as {}", new_order.uuid);
        self.call_order_created_hook(&new_order).await;
        Ok(new_order)
    }

    /// Checks that a merchant-side request for an order was signed by the order's project.
    ///
    /// `signature` is the hex HMAC of the exact request body, keyed with the project's secret. The order token is
    /// public, so it proves nothing on its own: a missing signature is refused as firmly as a wrong one, and so is a
    /// project that is no longer in the catalog.
    pub async fn authenticate_project_request(
        &self,
        uuid: &OrderUuid,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), OrderError> {
        let order = self.fetch_order(uuid).await?;
        let Some(signature) = signature else {
            warn!("🧾️ Unsigned merchant request for order {uuid}");
            return Err(OrderError::SignatureRequired);
        };
        let project = self.services.catalog.fetch_project(&order.project.id).await?.ok_or_else(|| {
            warn!("🧾️ Project {} of order {uuid} is no longer in the catalog", order.project.id);
            OrderError::InvalidSignature
        })?;
        verify_hmac(body, project.secret_key.reveal(), signature).map_err(|e| {
            warn!("🧾️ Merchant request for order {uuid} failed the signature check. {e}");
            OrderError::from(e)
        })
    }

    /// The merchant confirms (or refuses) fulfilment of a paid order.
    pub async fn confirm_by_project(&self, uuid: &OrderUuid, accepted: bool) -> Result<Order, OrderError> {
        let order = self.fetch_order(uuid).await?;
        let event = if accepted { OrderEvent::ProjectAccepted } else { OrderEvent::ProjectRejected };
        let change = self.transition(&order, event)?;
        let order = self.commit(change).await?;
        info!("🧾️ Order {uuid} is now {} after merchant confirmation", order.status);
        Ok(order)
    }

    pub async fn refund(&self, uuid: &OrderUuid, reason: &str) -> Result<Order, OrderError> {
        self.reverse_payment(uuid, OrderEvent::Refunded, AccountingEntryType::Refund, reason).await
    }

    pub async fn chargeback(&self, uuid: &OrderUuid, reason: &str) -> Result<Order, OrderError> {
        self.reverse_payment(uuid, OrderEvent::ChargedBack, AccountingEntryType::Chargeback, reason).await
    }

    /// Records that the key or code sold with a key-product order has been replaced.
    pub async fn replace_item(&self, uuid: &OrderUuid) -> Result<Order, OrderError> {
        let order = self.fetch_order(uuid).await?;
        if order.order_type != OrderType::KeyProduct {
            return Err(OrderError::ItemReplacementNotSupported);
        }
        let change = self.transition(&order, OrderEvent::ItemReplaced)?;
        let order = self.commit(change).await?;
        info!("🧾️ Item replaced for order {uuid}");
        Ok(order)
    }

    async fn reverse_payment(
        &self,
        uuid: &OrderUuid,
        event: OrderEvent,
        entry_type: AccountingEntryType,
        reason: &str,
    ) -> Result<Order, OrderError> {
        let order = self.fetch_order(uuid).await?;
        let cancellation = OrderCancellation { code: entry_type.to_string().to_lowercase(), reason: reason.to_string() };
        let change = self.transition(&order, event)?.with_cancellation(cancellation).with_accounting_entry(entry_type);
        let order = self.commit(change).await?;
        info!("🧾️ {entry_type} recorded for order {uuid}: {reason}");
        Ok(order)
    }

    //--------------------------------------   Shared helpers   ---------------------------------------------------------

    pub(super) fn form_deadline(&self) -> chrono::DateTime<Utc> {
        let lifetime = Duration::from_std(self.config.order_form_lifetime).unwrap_or_else(|_| Duration::minutes(30));
        Utc::now() + lifetime
    }

    /// Looks the event up in the transition table and prepares the guarded update.
    ///
    /// A merchant notification is scheduled if the public status changes and has not been announced before.
    pub(super) fn transition(&self, order: &Order, event: OrderEvent) -> Result<StatusChange, OrderError> {
        let next = order.status.apply(event)?;
        let change = StatusChange::new(order, next);
        let public = next.public_status();
        if public != order.public_status() && !order.is_notification_sent(public) {
            Ok(change.notify())
        } else {
            Ok(change)
        }
    }

    /// Writes the change and, once it is committed, queues the merchant notification.
    pub(super) async fn commit(&self, change: StatusChange) -> Result<Order, OrderError> {
        let notify = change.notification_flag.is_some();
        let order = self.db.apply_status_change(change).await?;
        if notify {
            self.notifier.enqueue(order.clone());
        }
        Ok(order)
    }

    pub(super) async fn call_order_created_hook(&self, order: &Order) {
        for emitter in &self.producers.order_created_producer {
            debug!("🧾️ Notifying order created hook subscribers");
            emitter.publish_event(OrderCreatedEvent::new(order.clone())).await;
        }
    }

    pub(super) async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            debug!("📞️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    pub(super) async fn call_order_declined_hook(&self, order: &Order) {
        for emitter in &self.producers.order_declined_producer {
            debug!("📞️ Notifying order declined hook subscribers");
            emitter.publish_event(OrderDeclinedEvent::new(order.clone())).await;
        }
    }
}
