use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use skyway_booking::{CheckoutError, LifecycleError, TicketError};
use skyway_core::passenger::{FieldError, ValidationErrors};
use skyway_core::referral::LedgerError;
use skyway_core::repository::RepositoryError;
use skyway_core::session::SessionError;
use skyway_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    FieldErrors(Vec<FieldError>),
    NotFoundError(String),
    ConflictError(String),
    /// The booking window has closed.
    GoneError(String),
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::FieldErrors(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(errors),
            ),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::GoneError(msg) => (StatusCode::GONE, msg, None),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, msg, None)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
            }
        };

        let body = match details {
            Some(details) => Json(json!({
                "error": error_message,
                "details": details,
            })),
            None => Json(json!({
                "error": error_message,
            })),
        };

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        Self::FieldErrors(err.0)
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => Self::NotFoundError(msg),
            RepositoryError::Conflict(msg) => Self::ConflictError(msg),
            RepositoryError::Backend(msg) => Self::InternalServerError(msg),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired(_) => Self::GoneError(err.to_string()),
            SessionError::InvalidTransition { .. } => Self::ConflictError(err.to_string()),
            SessionError::Store(_) => Self::Anyhow(anyhow::Error::new(err)),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => Self::ValidationError(msg),
            CoreError::InvalidCredentials => Self::AuthenticationError(err.to_string()),
            CoreError::IdentityError(msg) => Self::AuthenticationError(msg),
            CoreError::AccountExists(_) => Self::ConflictError(err.to_string()),
            CoreError::PaymentError(_) | CoreError::SupplierError(_) => Self::UpstreamError(err.to_string()),
            CoreError::InternalError(msg) => Self::InternalServerError(msg),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyProcessed(_) => Self::ConflictError(err.to_string()),
            _ => Self::ValidationError(err.to_string()),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        Self::ConflictError(err.to_string())
    }
}

impl From<TicketError> for AppError {
    fn from(err: TicketError) -> Self {
        Self::ConflictError(err.to_string())
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(errors) => errors.into(),
            CheckoutError::Repository(e) => e.into(),
            CheckoutError::Session(e) => e.into(),
            CheckoutError::Lifecycle(e) => e.into(),
            CheckoutError::Gateway(e) => e.into(),
            CheckoutError::BookingNotFound(_) | CheckoutError::FlightNotFound(_) => {
                Self::NotFoundError(err.to_string())
            }
            CheckoutError::Inventory(_) => Self::ConflictError(err.to_string()),
            CheckoutError::Catalog(_)
            | CheckoutError::InvalidSignature
            | CheckoutError::PaymentMismatch(_)
            | CheckoutError::InvalidUtr(_) => Self::ValidationError(err.to_string()),
            CheckoutError::PnrExhausted => Self::InternalServerError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_checkout_errors_map_to_statuses() {
        let cases = [
            (CheckoutError::BookingNotFound("ABC234".into()), StatusCode::NOT_FOUND),
            (CheckoutError::Session(SessionError::Expired(Uuid::nil())), StatusCode::GONE),
            (CheckoutError::InvalidSignature, StatusCode::BAD_REQUEST),
            (CheckoutError::Gateway(CoreError::PaymentError("down".into())), StatusCode::BAD_GATEWAY),
            (CheckoutError::PnrExhausted, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_field_errors_are_reported_as_details() {
        let err = AppError::from(ValidationErrors(vec![FieldError::new("contact.email", "Invalid email")]));
        match &err {
            AppError::FieldErrors(fields) => assert_eq!(fields[0].field, "contact.email"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
