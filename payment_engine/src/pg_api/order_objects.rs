use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use pg_common::Amount;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        BillingAddress,
        Order,
        OrderCancellation,
        OrderStatus,
        OrderType,
        OrderUuid,
        PaymentRequisites,
        PublicStatus,
    },
    helpers::{card_brand, mask_pan},
    order_status::OrderEvent,
    pg_api::errors::OrderError,
};

//--------------------------------------   Order creation     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUserRequest {
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub ip: Option<String>,
    pub locale: Option<String>,
    /// Used when no IP address is available for geolocation.
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreateRequest {
    pub project_id: String,
    /// The merchant's own id for this order. Unique per project.
    pub project_order_id: Option<String>,
    #[serde(default)]
    pub order_type: OrderType,
    /// Required for simple and virtual-currency orders. Ignored for product orders, whose amount is the sum of the
    /// product prices.
    pub amount: Option<Amount>,
    pub currency: Option<String>,
    #[serde(default)]
    pub products: Vec<String>,
    /// The payment method group alias, e.g. `BANKCARD`.
    pub payment_method: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub user: OrderUserRequest,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
    pub url_notify: Option<String>,
}

impl OrderCreateRequest {
    /// Builds a request from URL-encoded form parameters.
    ///
    /// Recognised keys are `project`, `order_id`, `type`, `amount`, `currency`, `products` (comma separated),
    /// `payment_method`, `description`, `external_id`, `email`, `phone`, `ip`, `locale`, `country`, `url_success`,
    /// `url_fail` and `url_notify`.
    pub fn from_form(params: &BTreeMap<String, String>) -> Result<Self, OrderError> {
        let get = |k: &str| params.get(k).filter(|v| !v.is_empty()).cloned();
        let amount = match get("amount") {
            Some(a) => Some(a.parse::<Amount>().map_err(|_| OrderError::AmountInvalid)?),
            None => None,
        };
        let order_type = match get("type").as_deref() {
            None | Some("simple") => OrderType::Simple,
            Some("product") => OrderType::Product,
            Some("key_product") => OrderType::KeyProduct,
            Some("virtual_currency") => OrderType::VirtualCurrency,
            Some(t) => return Err(OrderError::InvalidRequest(format!("unknown order type '{t}'"))),
        };
        let products = get("products")
            .map(|p| p.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        Ok(Self {
            project_id: get("project").unwrap_or_default(),
            project_order_id: get("order_id"),
            order_type,
            amount,
            currency: get("currency"),
            products,
            payment_method: get("payment_method"),
            description: get("description"),
            user: OrderUserRequest {
                external_id: get("external_id"),
                email: get("email"),
                phone: get("phone"),
                ip: get("ip"),
                locale: get("locale"),
                country: get("country"),
            },
            url_success: get("url_success"),
            url_fail: get("url_fail"),
            url_notify: get("url_notify"),
        })
    }

    pub fn has_dynamic_redirect_urls(&self) -> bool {
        self.url_success.is_some() || self.url_fail.is_some()
    }
}

/// What was signed, for requests that carry a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedPayload {
    /// The raw JSON request body, byte for byte.
    JsonBody(Vec<u8>),
    /// Form parameters. The signature is checked against their canonical form.
    FormParams(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub payload: SignedPayload,
    pub signature: Option<String>,
}

impl RequestSignature {
    pub fn json(body: Vec<u8>, signature: Option<String>) -> Self {
        Self { payload: SignedPayload::JsonBody(body), signature }
    }

    pub fn form(params: BTreeMap<String, String>) -> Self {
        let signature = params.get(crate::helpers::SIGNATURE_PARAM).cloned();
        Self { payload: SignedPayload::FormParams(params), signature }
    }
}

//--------------------------------------   Payment dispatch   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCreateRequest {
    pub order_uuid: OrderUuid,
    pub payment_method_id: String,
    /// Instrument data: `pan`, `cvv`, `month`, `year`, `card_holder`, `ewallet` or `address`, depending on the
    /// method type.
    #[serde(default)]
    pub fields: HashMap<String, String>,
    pub billing_address: Option<BillingAddress>,
}

impl PaymentCreateRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    pub fn billing_country(&self) -> Option<&str> {
        self.billing_address.as_ref().map(|a| a.country.as_str()).filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCreateResponse {
    pub order_uuid: OrderUuid,
    pub redirect_url: String,
    pub status: PublicStatus,
}

//--------------------------------------       Callbacks      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Completed,
    Declined,
    Canceled,
    Rejected,
}

impl CallbackOutcome {
    pub fn event(&self) -> OrderEvent {
        match self {
            CallbackOutcome::Completed => OrderEvent::PaymentCompleted,
            CallbackOutcome::Declined => OrderEvent::PaymentDeclined,
            CallbackOutcome::Canceled => OrderEvent::PaymentCanceled,
            CallbackOutcome::Rejected => OrderEvent::PaymentRejected,
        }
    }

    pub fn target_status(&self) -> OrderStatus {
        match self {
            CallbackOutcome::Completed => OrderStatus::PaymentSystemComplete,
            CallbackOutcome::Declined => OrderStatus::PaymentSystemDeclined,
            CallbackOutcome::Canceled => OrderStatus::PaymentSystemCanceled,
            CallbackOutcome::Rejected => OrderStatus::PaymentSystemReject,
        }
    }

    /// Whether an order in `status` has already absorbed this outcome. A successful payment stays "consistent" as
    /// the order moves on through merchant confirmation, refunds and so on.
    pub fn is_consistent_with(&self, status: OrderStatus) -> bool {
        match self {
            CallbackOutcome::Completed => status.is_paid(),
            _ => status == self.target_status(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRequisites {
    pub pan: Option<String>,
    pub card_brand: Option<String>,
    pub expiry_month: Option<String>,
    pub expiry_year: Option<String>,
    pub card_holder: Option<String>,
    pub wallet: Option<String>,
    pub crypto_address: Option<String>,
}

impl CallbackRequisites {
    /// Normalises what the provider sent. The card number is masked here, so the full number never reaches storage.
    pub fn normalise(&self) -> Option<PaymentRequisites> {
        if *self == CallbackRequisites::default() {
            return None;
        }
        let brand = self.card_brand.clone().or_else(|| self.pan.as_deref().and_then(card_brand).map(String::from));
        Some(PaymentRequisites {
            masked_pan: self.pan.as_deref().map(mask_pan),
            card_brand: brand,
            expiry_month: self.expiry_month.clone(),
            expiry_year: self.expiry_year.clone(),
            card_holder: self.card_holder.clone(),
            wallet: self.wallet.clone(),
            crypto_address: self.crypto_address.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub outcome: CallbackOutcome,
    pub amount: Amount,
    pub currency: String,
    pub transaction_id: Option<String>,
    pub decline_code: Option<String>,
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub requisites: CallbackRequisites,
}

impl CallbackPayload {
    pub fn cancellation(&self) -> Option<OrderCancellation> {
        match self.outcome {
            CallbackOutcome::Completed => None,
            outcome => Some(OrderCancellation {
                code: self.decline_code.clone().unwrap_or_else(|| format!("{outcome:?}").to_lowercase()),
                reason: self.decline_reason.clone().unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// The callback moved the order to a new status.
    Processed(Order),
    /// The order had already absorbed this outcome. Nothing was changed.
    AlreadyProcessed(Order),
}

impl CallbackResult {
    pub fn order(&self) -> &Order {
        match self {
            CallbackResult::Processed(o) | CallbackResult::AlreadyProcessed(o) => o,
        }
    }
}

//--------------------------------------      Public view     ---------------------------------------------------------
/// The view of an order that may be shown to payers and merchants. It never contains the internal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub uuid: OrderUuid,
    pub project_id: String,
    pub project_order_id: Option<String>,
    pub order_type: OrderType,
    pub amount: Amount,
    pub tax: Amount,
    pub total_amount: Amount,
    pub currency: String,
    pub status: PublicStatus,
    pub payment_method: Option<String>,
    pub user_address_data_required: bool,
    pub masked_pan: Option<String>,
    pub cancellation_reason: Option<String>,
    pub form_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            uuid: order.uuid.clone(),
            project_id: order.project.id.clone(),
            project_order_id: order.project_order_id.clone(),
            order_type: order.order_type,
            amount: order.amount,
            tax: order.tax,
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            status: order.public_status(),
            payment_method: order.payment_method.as_ref().map(|m| m.name.clone()),
            user_address_data_required: order.user_address_data_required,
            masked_pan: order.requisites.as_ref().and_then(|r| r.masked_pan.clone()),
            cancellation_reason: order.cancellation.as_ref().map(|c| c.reason.clone()),
            form_expires_at: order.form_expires_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// The message published to the merchant when an order changes public status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub order: OrderView,
    pub merchant_id: String,
    pub url_notify: Option<String>,
}

impl From<&Order> for OrderNotification {
    fn from(order: &Order) -> Self {
        Self {
            order: OrderView::from(order),
            merchant_id: order.project.merchant_id.clone(),
            url_notify: order.project.url_notify.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn form_parsing() {
        let mut params = BTreeMap::new();
        params.insert("project".to_string(), "proj-game".to_string());
        params.insert("amount".to_string(), "100.50".to_string());
        params.insert("currency".to_string(), "RUB".to_string());
        params.insert("products".to_string(), "a, b,,c".to_string());
        params.insert("type".to_string(), "product".to_string());
        params.insert("email".to_string(), "".to_string());
        let req = OrderCreateRequest::from_form(&params).unwrap();
        assert_eq!(req.project_id, "proj-game");
        assert_eq!(req.amount, Some(Amount::from_minor(10050)));
        assert_eq!(req.products, vec!["a", "b", "c"]);
        assert_eq!(req.order_type, OrderType::Product);
        assert!(req.user.email.is_none());

        params.insert("amount".to_string(), "ten".to_string());
        assert!(matches!(OrderCreateRequest::from_form(&params), Err(OrderError::AmountInvalid)));
    }

    #[test]
    fn callback_outcome_consistency() {
        assert!(CallbackOutcome::Completed.is_consistent_with(OrderStatus::PaymentSystemComplete));
        assert!(CallbackOutcome::Completed.is_consistent_with(OrderStatus::Refund));
        assert!(!CallbackOutcome::Completed.is_consistent_with(OrderStatus::PaymentSystemDeclined));
        assert!(CallbackOutcome::Declined.is_consistent_with(OrderStatus::PaymentSystemDeclined));
        assert!(!CallbackOutcome::Declined.is_consistent_with(OrderStatus::PaymentSystemComplete));
        assert!(!CallbackOutcome::Canceled.is_consistent_with(OrderStatus::PaymentSystemCreate));
    }

    #[test]
    fn requisites_are_masked() {
        let req = CallbackRequisites { pan: Some("4111111111111111".into()), ..Default::default() };
        let normalised = req.normalise().unwrap();
        assert_eq!(normalised.masked_pan.as_deref(), Some("411111******1111"));
        assert_eq!(normalised.card_brand.as_deref(), Some("VISA"));
        assert!(CallbackRequisites::default().normalise().is_none());
    }

    #[test]
    fn callback_payload_json() {
        let json = r#"{"outcome":"declined","amount":100.0,"currency":"RUB","decline_code":"51",
            "decline_reason":"Insufficient funds"}"#;
        let payload: CallbackPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.outcome, CallbackOutcome::Declined);
        assert_eq!(payload.amount, Amount::from_major(100));
        let c = payload.cancellation().unwrap();
        assert_eq!(c.code, "51");
        assert_eq!(c.reason, "Insufficient funds");
    }
}
