pub mod lifecycle;
pub mod checkout;
pub mod ticket;

pub use lifecycle::LifecycleError;
pub use checkout::{CheckoutService, CheckoutError, CheckoutRules, NewBooking};
pub use ticket::{ETicket, TicketError};
