use chrono::{DateTime, Utc};
use skyway_core::booking::{Booking, BookingStatus, PaymentMethod};

/// Whether a booking may move from `from` to `to`.
///
/// Pending → AwaitingVerification | Confirmed | PaymentFailed | Cancelled
/// AwaitingVerification → Confirmed | PaymentFailed | Cancelled
/// PaymentFailed → Pending (retry) | Cancelled
/// Confirmed → Cancelled
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (Pending, AwaitingVerification)
            | (Pending, Confirmed)
            | (Pending, PaymentFailed)
            | (Pending, Cancelled)
            | (AwaitingVerification, Confirmed)
            | (AwaitingVerification, PaymentFailed)
            | (AwaitingVerification, Cancelled)
            | (PaymentFailed, Pending)
            | (PaymentFailed, Cancelled)
            | (Confirmed, Cancelled)
    )
}

pub fn transition(booking: &mut Booking, to: BookingStatus, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    if !can_transition(booking.status, to) {
        return Err(LifecycleError::InvalidTransition {
            pnr: booking.pnr.clone(),
            from: booking.status,
            to,
        });
    }
    booking.status = to;
    booking.updated_at = now;
    Ok(())
}

/// Gateway callback or webhook verified: Pending → Confirmed.
pub fn confirm_gateway(booking: &mut Booking, payment_id: &str, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    transition(booking, BookingStatus::Confirmed, now)?;
    booking.payment_method = Some(PaymentMethod::Gateway);
    booking.payment_id = Some(payment_id.to_string());
    Ok(())
}

/// Customer paid the static VPA and sent the UTR: waits for an admin.
pub fn submit_upi(booking: &mut Booking, utr: &str, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    transition(booking, BookingStatus::AwaitingVerification, now)?;
    booking.payment_method = Some(PaymentMethod::Upi);
    booking.payment_id = Some(format!("UPI-{}", utr));
    Ok(())
}

/// Re-opens a failed booking for another payment attempt; no-op when already pending.
pub fn reopen(booking: &mut Booking, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    match booking.status {
        BookingStatus::Pending => Ok(()),
        _ => transition(booking, BookingStatus::Pending, now),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Booking {pnr} cannot move from {from} to {to}")]
    InvalidTransition {
        pnr: String,
        from: BookingStatus,
        to: BookingStatus,
    },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use skyway_core::booking::FareBreakdown;
    use skyway_core::flight::{CabinClass, FlightSnapshot};
    use skyway_shared::pii::Masked;
    use uuid::Uuid;

    pub(crate) fn booking(status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            pnr: "ABC234".to_string(),
            user_id: "user-1".to_string(),
            flight: FlightSnapshot {
                flight_id: Uuid::new_v4(),
                airline: "IndiGo".to_string(),
                flight_number: "6E-201".to_string(),
                origin: "DEL".to_string(),
                destination: "BOM".to_string(),
                departure_time: now,
                arrival_time: now,
                cabin_class: CabinClass::Economy,
                price_minor: 500_000,
                currency: "INR".to_string(),
            },
            passenger_count: 1,
            status,
            fare: FareBreakdown::default(),
            total_minor: 500_000,
            currency: "INR".to_string(),
            ancillaries: vec![],
            payment_method: None,
            payment_order_id: None,
            payment_id: None,
            contact_email: Masked("asha@example.com".to_string()),
            contact_phone: Masked("9876543210".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_gateway_lifecycle() {
        let mut b = booking(BookingStatus::Pending);
        confirm_gateway(&mut b, "pay_123", Utc::now()).unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.payment_id.as_deref(), Some("pay_123"));
        assert_eq!(b.payment_method, Some(PaymentMethod::Gateway));

        transition(&mut b, BookingStatus::Cancelled, Utc::now()).unwrap();
        assert!(transition(&mut b, BookingStatus::Pending, Utc::now()).is_err());
    }

    #[test]
    fn test_upi_lifecycle() {
        let mut b = booking(BookingStatus::Pending);
        submit_upi(&mut b, "412345678901", Utc::now()).unwrap();
        assert_eq!(b.status, BookingStatus::AwaitingVerification);
        assert_eq!(b.payment_id.as_deref(), Some("UPI-412345678901"));
        transition(&mut b, BookingStatus::Confirmed, Utc::now()).unwrap();
    }

    #[test]
    fn test_failed_payment_can_be_retried() {
        let mut b = booking(BookingStatus::PaymentFailed);
        reopen(&mut b, Utc::now()).unwrap();
        assert_eq!(b.status, BookingStatus::Pending);
        reopen(&mut b, Utc::now()).unwrap();
        assert_eq!(b.status, BookingStatus::Pending);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!can_transition(BookingStatus::Confirmed, BookingStatus::PaymentFailed));
        assert!(!can_transition(BookingStatus::Cancelled, BookingStatus::Confirmed));
        assert!(!can_transition(BookingStatus::PaymentFailed, BookingStatus::Confirmed));

        let mut b = booking(BookingStatus::Confirmed);
        assert!(confirm_gateway(&mut b, "pay_456", Utc::now()).is_err());
        assert!(reopen(&mut b, Utc::now()).is_err());
    }
}
