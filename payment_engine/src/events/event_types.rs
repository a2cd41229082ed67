use crate::db_types::Order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// The payment provider confirmed that the payer paid for the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// The payment provider declined, canceled or rejected the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDeclinedEvent {
    pub order: Order,
    pub reason: Option<String>,
}

impl OrderDeclinedEvent {
    pub fn new(order: Order) -> Self {
        let reason = order.cancellation.as_ref().map(|c| c.reason.clone());
        Self { order, reason }
    }
}
