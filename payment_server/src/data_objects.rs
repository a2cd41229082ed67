use actix_web::http::StatusCode;
use payment_engine::OrderError;
use serde::{Deserialize, Serialize};

/// The envelope every API route answers with.
///
/// `status` mirrors an HTTP status code: `200` on success, `400` for validation and business failures, `403` for
/// failed authenticity checks and `404` for unknown orders. The envelope itself is always delivered with a 200
/// response unless the failure is an infrastructure one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(item: T) -> Self {
        Self { status: StatusCode::OK.as_u16(), message: None, item: Some(item) }
    }

    pub fn failure<C: Into<String>, M: Into<String>>(status: u16, code: C, message: M) -> Self {
        Self { status, message: Some(ApiMessage { code: code.into(), message: message.into() }), item: None }
    }

    pub fn from_order_error(e: &OrderError) -> Self {
        let status = if e.is_not_found() {
            StatusCode::NOT_FOUND
        } else if e.is_authenticity_error() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::failure(status.as_u16(), e.code(), e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmOrderParams {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalParams {
    #[serde(default)]
    pub reason: String,
}

/// What the payer's browser is told, over the push gateway, when their payment goes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPush {
    pub order_uuid: String,
    pub status: String,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
}
