use std::{
    collections::BTreeSet,
    fmt::Display,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use log::error;
use pg_common::Amount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::order_status::{OrderStatus, PublicStatus};

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------       OrderUuid      ---------------------------------------------------------
/// The public, opaque order token. It is the only order identifier that ever appears in customer-facing URLs and
/// responses; the internal numeric id stays inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderUuid(pub String);

impl OrderUuid {
    /// Allocates a fresh random token (128 bits, hex encoded).
    pub fn random() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderUuid {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ConversionError(format!("'{s}' is not a valid order token")));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderUuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       OrderType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// The merchant supplies a bare amount.
    #[default]
    Simple,
    /// The order is a bundle of catalog products.
    Product,
    /// The order is a bundle of key products (activation codes).
    KeyProduct,
    /// A top-up of the project's virtual currency.
    VirtualCurrency,
}

impl OrderType {
    pub fn has_line_items(&self) -> bool {
        matches!(self, OrderType::Product | OrderType::KeyProduct)
    }
}

impl Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Simple => write!(f, "simple"),
            OrderType::Product => write!(f, "product"),
            OrderType::KeyProduct => write!(f, "key_product"),
            OrderType::VirtualCurrency => write!(f, "virtual_currency"),
        }
    }
}

//--------------------------------------      Snapshots       ---------------------------------------------------------
/// Copy of the project configuration taken when the order is created. Later edits to the project never change an
/// existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProject {
    pub id: String,
    pub merchant_id: String,
    pub name: String,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
    pub url_notify: Option<String>,
}

/// Copy of the payment method that the order is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaymentMethod {
    pub id: String,
    pub name: String,
    pub group: String,
    pub method_type: PaymentMethodType,
    pub payment_system_id: String,
    /// The provider adapter that handles payments for this method.
    pub handler: String,
    pub terminal_id: Option<String>,
    /// Shared secret used to authenticate provider callbacks for this order.
    pub callback_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    BankCard,
    Ewallet,
    Crypto,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUser {
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub ip: Option<String>,
    pub locale: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub subdivision: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub country: String,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub amount: Amount,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancellation {
    pub code: String,
    pub reason: String,
}

/// Normalised payment-instrument metadata reported by the provider. Card numbers are only ever stored masked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequisites {
    pub masked_pan: Option<String>,
    pub card_brand: Option<String>,
    pub expiry_month: Option<String>,
    pub expiry_year: Option<String>,
    pub card_holder: Option<String>,
    pub wallet: Option<String>,
    pub crypto_address: Option<String>,
}

//--------------------------------------         Order        ---------------------------------------------------------
/// The order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub uuid: OrderUuid,
    /// The order id as assigned by the merchant, if any. Unique per project.
    pub project_order_id: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub project: OrderProject,
    pub payment_method: Option<OrderPaymentMethod>,
    pub user: OrderUser,
    pub billing_address: Option<BillingAddress>,
    pub items: Vec<OrderItem>,
    pub description: Option<String>,
    /// The amount requested by the merchant, before tax.
    pub amount: Amount,
    pub currency: String,
    pub tax: Amount,
    /// The amount the payer is charged: `amount + tax`.
    pub total_amount: Amount,
    /// The payment system fee resolved from the cost schedule at dispatch time.
    pub fee: Amount,
    /// Set when payments from the payer's country are only possible after the payer supplies another billing
    /// country.
    pub user_address_data_required: bool,
    pub cancellation: Option<OrderCancellation>,
    pub requisites: Option<PaymentRequisites>,
    pub provider_transaction_id: Option<String>,
    /// Public statuses for which a merchant notification has already been scheduled.
    pub notifications_sent: BTreeSet<PublicStatus>,
    pub form_expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// The token of the order that replaced this one on re-creation.
    pub superseded_by: Option<OrderUuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn public_status(&self) -> PublicStatus {
        self.status.public_status()
    }

    pub fn is_notification_sent(&self, status: PublicStatus) -> bool {
        self.notifications_sent.contains(&status)
    }

    pub fn is_form_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.form_expires_at
    }
}

//--------------------------------------        NewOrder      ---------------------------------------------------------
/// A fully validated order that has not been persisted yet. The database assigns the internal id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub uuid: OrderUuid,
    pub project_order_id: Option<String>,
    pub order_type: OrderType,
    pub project: OrderProject,
    pub payment_method: Option<OrderPaymentMethod>,
    pub user: OrderUser,
    pub billing_address: Option<BillingAddress>,
    pub items: Vec<OrderItem>,
    pub description: Option<String>,
    pub amount: Amount,
    pub currency: String,
    pub tax: Amount,
    pub total_amount: Amount,
    pub user_address_data_required: bool,
    pub form_expires_at: DateTime<Utc>,
}

impl NewOrder {
    /// Materialises the aggregate once storage has assigned an id.
    pub fn into_order(self, id: i64, now: DateTime<Utc>) -> Order {
        Order {
            id,
            uuid: self.uuid,
            project_order_id: self.project_order_id,
            order_type: self.order_type,
            status: OrderStatus::New,
            project: self.project,
            payment_method: self.payment_method,
            user: self.user,
            billing_address: self.billing_address,
            items: self.items,
            description: self.description,
            amount: self.amount,
            currency: self.currency,
            tax: self.tax,
            total_amount: self.total_amount,
            fee: Amount::default(),
            user_address_data_required: self.user_address_data_required,
            cancellation: None,
            requisites: None,
            provider_transaction_id: None,
            notifications_sent: BTreeSet::new(),
            form_expires_at: self.form_expires_at,
            paid_at: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds the replacement for `order` on re-creation: same commercial content, new token, clean payment state.
    pub fn recreate_from(order: &Order, form_expires_at: DateTime<Utc>) -> Self {
        Self {
            uuid: OrderUuid::random(),
            project_order_id: order.project_order_id.clone(),
            order_type: order.order_type,
            project: order.project.clone(),
            payment_method: None,
            user: order.user.clone(),
            billing_address: order.billing_address.clone(),
            items: order.items.clone(),
            description: order.description.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            tax: order.tax,
            total_amount: order.total_amount,
            user_address_data_required: order.user_address_data_required,
            form_expires_at,
        }
    }
}

//--------------------------------------   AccountingEntry    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountingEntryType {
    Payment,
    Refund,
    Chargeback,
}

impl Display for AccountingEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountingEntryType::Payment => write!(f, "Payment"),
            AccountingEntryType::Refund => write!(f, "Refund"),
            AccountingEntryType::Chargeback => write!(f, "Chargeback"),
        }
    }
}

impl FromStr for AccountingEntryType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Payment" => Ok(Self::Payment),
            "Refund" => Ok(Self::Refund),
            "Chargeback" => Ok(Self::Chargeback),
            s => Err(ConversionError(format!("Invalid accounting entry type: {s}"))),
        }
    }
}

impl From<String> for AccountingEntryType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid accounting entry type: {value}. Defaulting to Payment");
            AccountingEntryType::Payment
        })
    }
}

/// An immutable ledger record. Entries are only ever inserted, at most once per order and entry type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingEntry {
    pub id: i64,
    pub order_id: i64,
    pub order_uuid: OrderUuid,
    pub entry_type: AccountingEntryType,
    pub amount: Amount,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccountingEntry {
    pub order_id: i64,
    pub order_uuid: OrderUuid,
    pub entry_type: AccountingEntryType,
    pub amount: Amount,
    pub currency: String,
}

impl NewAccountingEntry {
    pub fn for_order(order: &Order, entry_type: AccountingEntryType) -> Self {
        Self {
            order_id: order.id,
            order_uuid: order.uuid.clone(),
            entry_type,
            amount: order.total_amount,
            currency: order.currency.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn random_tokens_differ() {
        let a = OrderUuid::random();
        let b = OrderUuid::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().parse::<OrderUuid>().is_ok());
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        assert!("".parse::<OrderUuid>().is_err());
        assert!("../etc/passwd".parse::<OrderUuid>().is_err());
    }

    #[test]
    fn entry_type_round_trip() {
        for t in [AccountingEntryType::Payment, AccountingEntryType::Refund, AccountingEntryType::Chargeback] {
            assert_eq!(t.to_string().parse::<AccountingEntryType>().unwrap(), t);
        }
    }
}
