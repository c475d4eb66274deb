pub mod auth;
pub mod resiliency;

pub use auth::{customer_auth_middleware, admin_auth_middleware, is_admin};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker, ResiliencyState};
