use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use payment_engine::OrderError;
use thiserror::Error;

use crate::data_objects::ApiResponse;

/// Failures that become a transport-level error response.
///
/// Business and validation failures never end up here: they are answered with a normal envelope (see
/// [`crate::data_objects::ApiResponse`]). Only infrastructure problems are `ServerError`s.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal detail stays in the logs
        let body =
            ApiResponse::<()>::failure(status.as_u16(), "system", "A system error occurred. Please try again later.");
        HttpResponse::build(status).insert_header(ContentType::json()).json(body)
    }
}

/// Only system errors are converted. Everything else is a business outcome and must be answered with an envelope.
impl From<OrderError> for ServerError {
    fn from(e: OrderError) -> Self {
        ServerError::BackendError(e.to_string())
    }
}
