use pg_common::Amount;
use thiserror::Error;

use crate::{
    db_types::{OrderStatus, OrderUuid},
    helpers::SignatureError,
    order_status::TransitionError,
    traits::{CatalogError, GeoError, PaymentGatewayError, ProviderError, RatesError, TaxError},
};

/// Payment instrument fields that the payer must supply, by payment method type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    BankCardNumber,
    BankCardCvv,
    BankCardExpireMonth,
    BankCardExpireYear,
    BankCardHolder,
    EwalletIdentifier,
    CryptoAddress,
}

impl RequiredField {
    /// The form field name the payer submits.
    pub fn field_name(&self) -> &'static str {
        match self {
            RequiredField::BankCardNumber => "pan",
            RequiredField::BankCardCvv => "cvv",
            RequiredField::BankCardExpireMonth => "month",
            RequiredField::BankCardExpireYear => "year",
            RequiredField::BankCardHolder => "card_holder",
            RequiredField::EwalletIdentifier => "ewallet",
            RequiredField::CryptoAddress => "address",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RequiredField::BankCardNumber => "fm000018",
            RequiredField::BankCardCvv => "fm000019",
            RequiredField::BankCardExpireMonth => "fm000020",
            RequiredField::BankCardExpireYear => "fm000021",
            RequiredField::BankCardHolder => "fm000022",
            RequiredField::EwalletIdentifier => "fm000023",
            RequiredField::CryptoAddress => "fm000024",
        }
    }
}

/// Every failure the order lifecycle can produce.
///
/// All variants except `Storage`, `Collaborator` and `Internal` are business or validation failures: the request
/// itself is wrong and retrying it will not help. Each carries a stable machine-readable code (see [`OrderError::code`]).
#[derive(Debug, Clone, Error)]
pub enum OrderError {
    // ---- Order creation ----
    #[error("The request is malformed: {0}")]
    InvalidRequest(String),
    #[error("Project with the given identifier was not found")]
    ProjectNotFound,
    #[error("Project is not accepting orders")]
    ProjectInactive,
    #[error("Currency {0} is not supported")]
    CurrencyNotFound(String),
    #[error("Currency is required for this project")]
    CurrencyIsRequired,
    #[error("The payer's region could not be determined")]
    PayerRegionUnknown,
    #[error("Payments from the payer's country are not allowed")]
    CountryPaymentsNotAllowed,
    #[error("A billing address in a country that accepts payments is required")]
    BillingCountryRequired,
    #[error("No products were specified for the order")]
    ProductsEmpty,
    #[error("Some of the requested products are unknown, disabled or belong to another project")]
    ProductsInvalid,
    #[error("The requested products have no price in a common currency")]
    NoProductsCommonCurrency,
    #[error("The order amount must be greater than zero")]
    AmountInvalid,
    #[error("An order with the same project order id already exists")]
    DuplicateOrder,
    #[error("Payment method was not found")]
    PaymentMethodNotFound,
    #[error("Payment method is not active")]
    PaymentMethodInactive,
    #[error("Payment system is not active")]
    PaymentSystemInactive,
    #[error("Amount is less than the project minimum of {0}")]
    ProjectMinAmount(Amount),
    #[error("Amount is greater than the project maximum of {0}")]
    ProjectMaxAmount(Amount),
    #[error("Amount is less than the payment method minimum of {0}")]
    MethodMinAmount(Amount),
    #[error("Amount is greater than the payment method maximum of {0}")]
    MethodMaxAmount(Amount),
    #[error("Amount is lower than the minimum allowed payment of {0}")]
    AmountLowerThanMinAllowed(Amount),
    #[error("No minimum payment amount is configured for currency {0}")]
    MinimumAmountNotConfigured(String),
    #[error("This project only accepts signed requests")]
    SignatureRequired,
    #[error("The request signature is invalid")]
    InvalidSignature,
    #[error("Dynamic redirect URLs are not allowed for this project")]
    DynamicRedirectUrlsNotAllowed,
    #[error("Dynamic notify URLs are not allowed for this project")]
    DynamicNotifyUrlsNotAllowed,

    // ---- Payment dispatch ----
    #[error("Order {0} was not found")]
    OrderNotFound(OrderUuid),
    #[error("Order is in an ended state ({0}) and cannot be paid")]
    OrderInEndedState(OrderStatus),
    #[error("The payment form has expired")]
    FormExpired,
    #[error("No cost schedule was found for this payment method, region and currency")]
    CostScheduleNotFound,
    #[error("Required field '{}' is missing", .0.field_name())]
    MissingField(RequiredField),
    #[error("The payment system could not create the payment: {0}")]
    PaymentSystemError(String),

    // ---- Callbacks ----
    #[error("The callback signature is invalid")]
    InvalidCallbackSignature,
    #[error("The callback payload is invalid: {0}")]
    CallbackPayloadInvalid(String),
    #[error("The callback amount {actual} does not match the order amount {expected}")]
    CallbackAmountMismatch { expected: Amount, actual: Amount },
    #[error("The callback currency {actual} does not match the order currency {expected}")]
    CallbackCurrencyMismatch { expected: String, actual: String },
    #[error("The order has no payment method bound to it")]
    OrderPaymentMethodMissing,
    #[error("{0}")]
    StatusTransitionForbidden(#[from] TransitionError),

    // ---- Lifecycle ----
    #[error("Order in status {0} cannot be re-created")]
    OrderCantBeRecreated(OrderStatus),
    #[error("Item replacement is only available for key-product orders")]
    ItemReplacementNotSupported,
    #[error("Order {0} has already been re-created")]
    OrderAlreadyRecreated(OrderUuid),
    #[error("Order has been replaced by {0} and cannot be paid")]
    OrderSuperseded(OrderUuid),

    // ---- System ----
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("External service error: {0}")]
    Collaborator(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::InvalidRequest(_) => "fm000048",
            OrderError::ProjectNotFound => "fm000002",
            OrderError::ProjectInactive => "fm000003",
            OrderError::CurrencyNotFound(_) => "fm000005",
            OrderError::CurrencyIsRequired => "fm000006",
            OrderError::PayerRegionUnknown => "fm000007",
            OrderError::CountryPaymentsNotAllowed => "fm000008",
            OrderError::BillingCountryRequired => "fm000009",
            OrderError::ProductsEmpty => "fm000010",
            OrderError::ProductsInvalid => "fm000011",
            OrderError::NoProductsCommonCurrency => "fm000012",
            OrderError::AmountInvalid => "fm000013",
            OrderError::DuplicateOrder => "fm000014",
            OrderError::PaymentMethodNotFound => "fm000015",
            OrderError::PaymentMethodInactive => "fm000016",
            OrderError::PaymentSystemInactive => "fm000017",
            OrderError::MissingField(f) => f.code(),
            OrderError::ProjectMinAmount(_) => "fm000025",
            OrderError::ProjectMaxAmount(_) => "fm000026",
            OrderError::MethodMinAmount(_) => "fm000027",
            OrderError::MethodMaxAmount(_) => "fm000028",
            OrderError::AmountLowerThanMinAllowed(_) => "fm000029",
            OrderError::MinimumAmountNotConfigured(_) => "fm000030",
            OrderError::SignatureRequired => "fm000031",
            OrderError::InvalidSignature => "fm000032",
            OrderError::DynamicRedirectUrlsNotAllowed => "fm000033",
            OrderError::DynamicNotifyUrlsNotAllowed => "fm000034",
            OrderError::OrderNotFound(_) => "fm000035",
            OrderError::OrderInEndedState(_) => "fm000036",
            OrderError::FormExpired => "fm000037",
            OrderError::CostScheduleNotFound => "fm000038",
            OrderError::PaymentSystemError(_) => "fm000039",
            OrderError::InvalidCallbackSignature => "fm000040",
            OrderError::CallbackPayloadInvalid(_) => "fm000041",
            OrderError::CallbackAmountMismatch { .. } => "fm000042",
            OrderError::CallbackCurrencyMismatch { .. } => "fm000043",
            OrderError::OrderPaymentMethodMissing => "fm000044",
            OrderError::StatusTransitionForbidden(_) => "fm000045",
            OrderError::OrderCantBeRecreated(_) => "fm000046",
            OrderError::ItemReplacementNotSupported => "fm000047",
            OrderError::OrderAlreadyRecreated(_) => "fm000049",
            OrderError::OrderSuperseded(_) => "fm000050",
            OrderError::Storage(_) | OrderError::Collaborator(_) | OrderError::Internal(_) => "fm000001",
        }
    }

    /// Infrastructure failures. The request may succeed if it is retried later.
    pub fn is_system_error(&self) -> bool {
        matches!(self, OrderError::Storage(_) | OrderError::Collaborator(_) | OrderError::Internal(_))
    }

    /// The request failed an authenticity check.
    pub fn is_authenticity_error(&self) -> bool {
        matches!(self, OrderError::SignatureRequired | OrderError::InvalidSignature | OrderError::InvalidCallbackSignature)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrderError::OrderNotFound(_))
    }
}

impl From<PaymentGatewayError> for OrderError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::DuplicateOrder(_) => OrderError::DuplicateOrder,
            PaymentGatewayError::OrderNotFound(uuid) => OrderError::OrderNotFound(uuid),
            PaymentGatewayError::Transition(e) => OrderError::StatusTransitionForbidden(e),
            PaymentGatewayError::AlreadySuperseded(uuid) => OrderError::OrderAlreadyRecreated(uuid),
            e => OrderError::Storage(e.to_string()),
        }
    }
}

impl From<CatalogError> for OrderError {
    fn from(e: CatalogError) -> Self {
        OrderError::Collaborator(e.to_string())
    }
}

impl From<GeoError> for OrderError {
    fn from(_: GeoError) -> Self {
        OrderError::PayerRegionUnknown
    }
}

impl From<RatesError> for OrderError {
    fn from(e: RatesError) -> Self {
        OrderError::Collaborator(e.to_string())
    }
}

impl From<TaxError> for OrderError {
    fn from(e: TaxError) -> Self {
        OrderError::Collaborator(e.to_string())
    }
}

impl From<ProviderError> for OrderError {
    fn from(e: ProviderError) -> Self {
        OrderError::PaymentSystemError(e.to_string())
    }
}

impl From<SignatureError> for OrderError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::Missing => OrderError::SignatureRequired,
            _ => OrderError::InvalidSignature,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_are_unique_for_business_errors() {
        let errors = [
            OrderError::ProjectNotFound,
            OrderError::ProjectInactive,
            OrderError::CurrencyNotFound("X".into()),
            OrderError::CurrencyIsRequired,
            OrderError::PayerRegionUnknown,
            OrderError::CountryPaymentsNotAllowed,
            OrderError::BillingCountryRequired,
            OrderError::ProductsEmpty,
            OrderError::ProductsInvalid,
            OrderError::NoProductsCommonCurrency,
            OrderError::DuplicateOrder,
            OrderError::ProjectMinAmount(Amount::default()),
            OrderError::ProjectMaxAmount(Amount::default()),
            OrderError::MethodMinAmount(Amount::default()),
            OrderError::MethodMaxAmount(Amount::default()),
            OrderError::MissingField(RequiredField::BankCardNumber),
            OrderError::MissingField(RequiredField::BankCardCvv),
            OrderError::FormExpired,
            OrderError::OrderAlreadyRecreated(OrderUuid("a".into())),
            OrderError::OrderSuperseded(OrderUuid("b".into())),
        ];
        let mut codes = errors.iter().map(|e| e.code()).collect::<Vec<_>>();
        let n = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), n);
        assert!(errors.iter().all(|e| !e.is_system_error()));
    }

    #[test]
    fn storage_errors_are_system_errors() {
        let dup: OrderError = PaymentGatewayError::DuplicateOrder("x".into()).into();
        assert!(matches!(dup, OrderError::DuplicateOrder));
        let db: OrderError = PaymentGatewayError::DatabaseError("disk full".into()).into();
        assert!(db.is_system_error());
        assert_eq!(db.code(), "fm000001");
    }
}
