pub mod flight;
pub mod search;
pub mod passenger;
pub mod booking;
pub mod pnr;
pub mod session;
pub mod profile;
pub mod referral;
pub mod repository;
pub mod identity;
pub mod payment;
pub mod supplier;

/// Failures reported by the external collaborators (auth provider, payment
/// gateway, live data feeds).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account already exists: {0}")]
    AccountExists(String),
    #[error("Payment gateway error: {0}")]
    PaymentError(String),
    #[error("Supplier error: {0}")]
    SupplierError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
