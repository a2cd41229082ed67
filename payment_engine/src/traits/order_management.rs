use chrono::{DateTime, Utc};
use pg_common::Amount;
use thiserror::Error;

use crate::{
    db_types::{
        AccountingEntry,
        AccountingEntryType,
        BillingAddress,
        NewOrder,
        Order,
        OrderCancellation,
        OrderPaymentMethod,
        OrderStatus,
        OrderUuid,
        PaymentRequisites,
        PublicStatus,
    },
    order_status::TransitionError,
};

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("An order with the same project order id already exists. {0}")]
    DuplicateOrder(String),
    #[error("The accounting entry already exists. {0}")]
    DuplicateAccountingEntry(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderUuid),
    #[error("Order {order_id} was expected to be in status {expected}, but it is {actual}")]
    StatusChanged { order_id: i64, expected: OrderStatus, actual: OrderStatus },
    #[error("Order {0} has already been re-created")]
    AlreadySuperseded(OrderUuid),
    #[error("{0}")]
    Transition(#[from] TransitionError),
    #[error("Could not (de)serialize the order document. {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref de) if de.is_unique_violation() => {
                if de.message().contains("accounting_entries") {
                    PaymentGatewayError::DuplicateAccountingEntry(de.message().to_string())
                } else {
                    PaymentGatewayError::DuplicateOrder(de.message().to_string())
                }
            },
            e => PaymentGatewayError::DatabaseError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for PaymentGatewayError {
    fn from(e: serde_json::Error) -> Self {
        PaymentGatewayError::SerializationError(e.to_string())
    }
}

/// A guarded status update.
///
/// The change is only applied if the stored order is still in `expected_status`. All the optional fields are
/// written in the same atomic step as the status, together with an accounting entry if one is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: i64,
    pub expected_status: OrderStatus,
    pub new_status: OrderStatus,
    pub payment_method: Option<OrderPaymentMethod>,
    pub billing_address: Option<BillingAddress>,
    pub provider_transaction_id: Option<String>,
    pub fee: Option<Amount>,
    pub requisites: Option<PaymentRequisites>,
    pub cancellation: Option<OrderCancellation>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Marks the notification for this public status as scheduled.
    pub notification_flag: Option<PublicStatus>,
    pub accounting_entry: Option<AccountingEntryType>,
}

impl StatusChange {
    pub fn new(order: &Order, new_status: OrderStatus) -> Self {
        Self {
            order_id: order.id,
            expected_status: order.status,
            new_status,
            payment_method: None,
            billing_address: None,
            provider_transaction_id: None,
            fee: None,
            requisites: None,
            cancellation: None,
            paid_at: None,
            notification_flag: None,
            accounting_entry: None,
        }
    }

    pub fn with_payment_method(mut self, method: OrderPaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn with_billing_address(mut self, address: Option<BillingAddress>) -> Self {
        self.billing_address = address;
        self
    }

    pub fn with_transaction(mut self, transaction_id: Option<String>, fee: Amount) -> Self {
        self.provider_transaction_id = transaction_id;
        self.fee = Some(fee);
        self
    }

    pub fn with_requisites(mut self, requisites: Option<PaymentRequisites>) -> Self {
        self.requisites = requisites;
        self
    }

    pub fn with_cancellation(mut self, cancellation: OrderCancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn paid_at(mut self, at: DateTime<Utc>) -> Self {
        self.paid_at = Some(at);
        self
    }

    pub fn notify(mut self) -> Self {
        self.notification_flag = Some(self.new_status.public_status());
        self
    }

    pub fn with_accounting_entry(mut self, entry_type: AccountingEntryType) -> Self {
        self.accounting_entry = Some(entry_type);
        self
    }

    /// Applies the field changes to an in-memory copy of the order. Used by storage backends.
    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        order.status = self.new_status;
        order.updated_at = now;
        if let Some(method) = &self.payment_method {
            order.payment_method = Some(method.clone());
        }
        if let Some(address) = &self.billing_address {
            order.billing_address = Some(address.clone());
        }
        if self.provider_transaction_id.is_some() {
            order.provider_transaction_id = self.provider_transaction_id.clone();
        }
        if let Some(fee) = self.fee {
            order.fee = fee;
        }
        if let Some(requisites) = &self.requisites {
            order.requisites = Some(requisites.clone());
        }
        if let Some(cancellation) = &self.cancellation {
            order.cancellation = Some(cancellation.clone());
        }
        if let Some(at) = self.paid_at {
            order.paid_at = Some(at);
        }
        if let Some(flag) = self.notification_flag {
            order.notifications_sent.insert(flag);
        }
    }
}

/// Storage operations for the order aggregate and its accounting entries.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    async fn fetch_order_by_uuid(&self, uuid: &OrderUuid) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError>;

    /// Checks whether a live (not superseded) order with the given merchant order id exists for the project.
    async fn project_order_exists(&self, project_id: &str, project_order_id: &str)
        -> Result<bool, PaymentGatewayError>;

    /// Stores a new order with status `New`.
    ///
    /// The storage layer is the final authority on `(project_id, project_order_id)` uniqueness: if another order won
    /// the race, [`PaymentGatewayError::DuplicateOrder`] is returned and nothing is written.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// Applies a guarded status update in a single transaction.
    ///
    /// ## Failure modes:
    /// - [`PaymentGatewayError::OrderIdNotFound`] if the order does not exist.
    /// - [`PaymentGatewayError::StatusChanged`] if another writer moved the order first. Nothing is written.
    /// - [`PaymentGatewayError::DuplicateAccountingEntry`] if the requested entry already exists. Nothing is written.
    async fn apply_status_change(&self, change: StatusChange) -> Result<Order, PaymentGatewayError>;

    /// In one transaction, marks `old` as superseded by `replacement` and stores the replacement.
    async fn recreate_order(&self, old: &Order, replacement: NewOrder) -> Result<Order, PaymentGatewayError>;

    async fn fetch_accounting_entries(&self, order_id: i64) -> Result<Vec<AccountingEntry>, PaymentGatewayError>;
}
