use pg_common::Amount;

use crate::{
    catalog::{Merchant, PaymentMethod, PaymentSystem, Project},
    db_types::{OrderItem, OrderUser},
    pg_api::{
        errors::OrderError,
        order_objects::{OrderCreateRequest, RequestSignature},
    },
};

/// Everything the validation stages have learned about an order request so far.
///
/// The context is passed *by value* from stage to stage. A stage either returns the context it was given, possibly
/// with more fields filled in, or fails. Nothing is shared between requests and nothing here is ever persisted.
#[derive(Debug, Clone)]
pub struct CheckedContext {
    pub request: OrderCreateRequest,
    pub signature: Option<RequestSignature>,
    pub project: Option<Project>,
    pub merchant: Option<Merchant>,
    pub currency: Option<String>,
    pub user: OrderUser,
    /// Payments from the payer's country are banned, but the payer may supply a billing address elsewhere.
    pub user_address_data_required: bool,
    pub items: Vec<OrderItem>,
    pub amount: Option<Amount>,
    pub payment_method: Option<(PaymentMethod, PaymentSystem)>,
}

impl CheckedContext {
    pub fn new(request: OrderCreateRequest, signature: Option<RequestSignature>) -> Self {
        Self {
            request,
            signature,
            project: None,
            merchant: None,
            currency: None,
            user: OrderUser::default(),
            user_address_data_required: false,
            items: Vec::new(),
            amount: None,
            payment_method: None,
        }
    }

    // The accessors below fail with an internal error if a stage runs before the stage that fills the field in.

    pub fn project(&self) -> Result<&Project, OrderError> {
        self.project.as_ref().ok_or_else(|| OrderError::Internal("project has not been resolved".into()))
    }

    pub fn merchant(&self) -> Result<&Merchant, OrderError> {
        self.merchant.as_ref().ok_or_else(|| OrderError::Internal("merchant has not been resolved".into()))
    }

    pub fn currency(&self) -> Result<&str, OrderError> {
        self.currency.as_deref().ok_or(OrderError::CurrencyIsRequired)
    }

    pub fn amount(&self) -> Result<Amount, OrderError> {
        self.amount.ok_or_else(|| OrderError::Internal("amount has not been resolved".into()))
    }
}
