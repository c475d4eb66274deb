use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use skyway_catalog::{inventory, AncillaryCatalog, AncillarySelection, CatalogError, InventoryError, PricingEngine};
use skyway_core::booking::{Booking, BookingDetail, BookingStatus, PaymentMethod};
use skyway_core::flight::FlightSnapshot;
use skyway_core::passenger::{validate_party, ContactForm, FieldError, PassengerForm, ValidationErrors};
use skyway_core::payment::{is_valid_utr, GatewayOrder, PaymentGateway};
use skyway_core::pnr::generate_pnr;
use skyway_core::referral::Referral;
use skyway_core::repository::{
    BookingRepository, FlightRepository, PassengerRepository, ProfileRepository, ReferralRepository, RepositoryError,
};
use skyway_core::session::{BookingSession, BookingStep, SessionError};
use skyway_core::CoreError;
use skyway_shared::models::events::{BookingEvent, BookingEventKind};
use skyway_shared::pii::Masked;

use crate::lifecycle::{self, LifecycleError};

const PNR_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct CheckoutRules {
    /// Credited to the referrer on the referred user's first confirmed booking.
    pub referral_reward_minor: i64,
}

impl Default for CheckoutRules {
    fn default() -> Self {
        Self {
            referral_reward_minor: 10_000,
        }
    }
}

/// Passenger step submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub passengers: Vec<PassengerForm>,
    pub contact: ContactForm,
    #[serde(default)]
    pub ancillaries: Vec<AncillarySelection>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] CoreError),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Flight not found: {0}")]
    FlightNotFound(Uuid),

    #[error("Payment signature verification failed")]
    InvalidSignature,

    #[error("Payment order does not belong to booking {0}")]
    PaymentMismatch(String),

    #[error("Invalid UPI transaction reference: {0}")]
    InvalidUtr(String),

    #[error("Could not allocate a unique PNR")]
    PnrExhausted,
}

/// Insert-and-confirm flow behind the booking screens: passengers in,
/// payment out, status changes broadcast to anyone watching the PNR.
pub struct CheckoutService {
    flights: Arc<dyn FlightRepository>,
    bookings: Arc<dyn BookingRepository>,
    passengers: Arc<dyn PassengerRepository>,
    profiles: Arc<dyn ProfileRepository>,
    referrals: Arc<dyn ReferralRepository>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: PricingEngine,
    catalog: AncillaryCatalog,
    events: broadcast::Sender<BookingEvent>,
    rules: CheckoutRules,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flights: Arc<dyn FlightRepository>,
        bookings: Arc<dyn BookingRepository>,
        passengers: Arc<dyn PassengerRepository>,
        profiles: Arc<dyn ProfileRepository>,
        referrals: Arc<dyn ReferralRepository>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: PricingEngine,
        catalog: AncillaryCatalog,
        events: broadcast::Sender<BookingEvent>,
        rules: CheckoutRules,
    ) -> Self {
        Self {
            flights,
            bookings,
            passengers,
            profiles,
            referrals,
            gateway,
            pricing,
            catalog,
            events,
            rules,
        }
    }

    pub fn gateway_key_id(&self) -> &str {
        self.gateway.key_id()
    }

    pub fn catalog(&self) -> &AncillaryCatalog {
        &self.catalog
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Passenger step: validates the forms, prices the booking, inserts the
    /// booking and passenger rows and moves the session on to payment.
    pub async fn create_booking(
        &self,
        session: &mut BookingSession,
        request: NewBooking,
        now: DateTime<Utc>,
    ) -> Result<BookingDetail, CheckoutError> {
        if session.is_expired(now) {
            return Err(SessionError::Expired(session.id).into());
        }

        // 1. Forms
        validate_party(&request.passengers, &request.contact)?;
        let count = request.passengers.len() as u32;
        if count != session.passengers {
            return Err(ValidationErrors(vec![FieldError::new(
                "passengers",
                format!("Expected {} passengers, got {}", session.passengers, count),
            )])
            .into());
        }

        // 2. Flight + seats
        let flight = self
            .flights
            .get(session.flight_id)
            .await?
            .ok_or(CheckoutError::FlightNotFound(session.flight_id))?;
        inventory::check_availability(flight.seats_available, count)?;

        // 3. Price
        let ancillaries = self.catalog.resolve(&request.ancillaries, count)?;
        let fare = self.pricing.quote(flight.price_minor, count, &ancillaries);

        // 4. Insert booking, regenerating the PNR on collisions
        let mut draft = Booking {
            id: Uuid::new_v4(),
            pnr: generate_pnr(),
            user_id: session.user_id.clone(),
            flight: FlightSnapshot::from(&flight),
            passenger_count: count as i32,
            status: BookingStatus::Pending,
            total_minor: fare.total_minor,
            fare,
            currency: flight.currency.clone(),
            ancillaries,
            payment_method: None,
            payment_order_id: None,
            payment_id: None,
            contact_email: Masked(request.contact.email.trim().to_ascii_lowercase()),
            contact_phone: Masked(skyway_core::passenger::normalize_phone(&request.contact.phone)),
            created_at: now,
            updated_at: now,
        };

        let mut created = None;
        for _ in 0..PNR_ATTEMPTS {
            match self.bookings.create(&draft).await {
                Ok(booking) => {
                    created = Some(booking);
                    break;
                }
                Err(RepositoryError::Conflict(_)) => {
                    warn!("PNR collision on {}, regenerating", draft.pnr);
                    draft.pnr = generate_pnr();
                }
                Err(e) => return Err(e.into()),
            }
        }
        let booking = created.ok_or(CheckoutError::PnrExhausted)?;

        // 5. Passenger rows; contact details go on the lead passenger
        let rows: Vec<_> = request
            .passengers
            .into_iter()
            .enumerate()
            .map(|(i, form)| form.into_passenger(booking.id, i as i32, (i == 0).then_some(&request.contact)))
            .collect();
        let passengers = match self.passengers.create_many(&rows).await {
            Ok(passengers) => passengers,
            Err(e) => {
                warn!("Passenger insert failed for booking {}, removing it: {}", booking.pnr, e);
                if let Err(cleanup) = self.bookings.delete(booking.id).await {
                    error!("Failed to remove booking {} without passengers: {}", booking.pnr, cleanup);
                }
                return Err(e.into());
            }
        };

        session.booking_pnr = Some(booking.pnr.clone());
        session.advance(BookingStep::Payment, now)?;

        info!(
            "Booking {} created for {} ({} pax, total {} {})",
            booking.pnr, booking.user_id, count, booking.total_minor, booking.currency
        );
        self.publish(&booking, BookingEventKind::Created);

        Ok(BookingDetail { booking, passengers })
    }

    pub async fn detail(&self, pnr: &str) -> Result<BookingDetail, CheckoutError> {
        let booking = self.load(pnr).await?;
        let passengers = self.passengers.list_for_booking(booking.id).await?;
        Ok(BookingDetail { booking, passengers })
    }

    /// Creates the gateway order the checkout widget is opened with.
    pub async fn start_payment(&self, pnr: &str, now: DateTime<Utc>) -> Result<GatewayOrder, CheckoutError> {
        let mut booking = self.load(pnr).await?;
        let previous = booking.status;
        lifecycle::reopen(&mut booking, now)?;

        let order = self
            .gateway
            .create_order(&booking.pnr, booking.total_minor, &booking.currency)
            .await?;

        booking.payment_method = Some(PaymentMethod::Gateway);
        booking.payment_order_id = Some(order.id.clone());
        booking.updated_at = now;
        self.bookings.update(&booking, previous).await?;

        info!("Gateway order {} opened for booking {}", order.id, booking.pnr);
        Ok(order)
    }

    /// Completion callback from the checkout widget.
    pub async fn confirm_gateway_payment(
        &self,
        pnr: &str,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<Booking, CheckoutError> {
        let mut booking = self.load(pnr).await?;

        if booking.payment_order_id.as_deref() != Some(order_id) {
            return Err(CheckoutError::PaymentMismatch(booking.pnr));
        }
        // The webhook may have landed first
        if booking.status == BookingStatus::Confirmed && booking.payment_id.as_deref() == Some(payment_id) {
            return Ok(booking);
        }

        let previous = booking.status;
        if !self.gateway.verify_payment(order_id, payment_id, signature) {
            warn!("Signature mismatch for booking {} (order {})", booking.pnr, order_id);
            if lifecycle::can_transition(previous, BookingStatus::PaymentFailed) {
                lifecycle::transition(&mut booking, BookingStatus::PaymentFailed, now)?;
                let booking = self.bookings.update(&booking, previous).await?;
                self.publish(&booking, BookingEventKind::StatusChanged);
            }
            return Err(CheckoutError::InvalidSignature);
        }

        self.settle_gateway(booking, payment_id, now).await
    }

    /// Server-to-server notification; the body signature has already been checked.
    pub async fn apply_gateway_webhook(
        &self,
        pnr: &str,
        order_id: &str,
        payment_id: &str,
        captured: bool,
        now: DateTime<Utc>,
    ) -> Result<Booking, CheckoutError> {
        let booking = self.load(pnr).await?;

        if booking.payment_order_id.as_deref() != Some(order_id) {
            return Err(CheckoutError::PaymentMismatch(booking.pnr));
        }

        if !captured {
            // A failed attempt leaves the order open for a retry in the same widget
            warn!("Gateway reported failed payment {} for booking {}", payment_id, booking.pnr);
            return Ok(booking);
        }
        if booking.status == BookingStatus::Confirmed {
            return Ok(booking);
        }
        self.settle_gateway(booking, payment_id, now).await
    }

    // Verified capture: a booking marked failed by an earlier attempt is reopened first.
    async fn settle_gateway(
        &self,
        mut booking: Booking,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Booking, CheckoutError> {
        let previous = booking.status;
        if previous == BookingStatus::PaymentFailed {
            lifecycle::reopen(&mut booking, now)?;
        }
        lifecycle::confirm_gateway(&mut booking, payment_id, now)?;
        self.finalize(booking, previous).await
    }

    /// Manual UPI path: the customer reports the transaction reference.
    pub async fn submit_upi(&self, pnr: &str, utr: &str, now: DateTime<Utc>) -> Result<Booking, CheckoutError> {
        let utr = utr.trim();
        if !is_valid_utr(utr) {
            return Err(CheckoutError::InvalidUtr(utr.to_string()));
        }

        let mut booking = self.load(pnr).await?;
        let previous = booking.status;
        lifecycle::reopen(&mut booking, now)?;
        lifecycle::submit_upi(&mut booking, utr, now)?;

        let booking = self.bookings.update(&booking, previous).await?;
        info!("Booking {} awaiting UPI verification", booking.pnr);
        self.publish(&booking, BookingEventKind::PaymentRecorded);
        Ok(booking)
    }

    /// Admin decision on a reported UPI payment.
    pub async fn review_upi(&self, pnr: &str, approve: bool, now: DateTime<Utc>) -> Result<Booking, CheckoutError> {
        let mut booking = self.load(pnr).await?;
        let previous = booking.status;

        if approve {
            lifecycle::transition(&mut booking, BookingStatus::Confirmed, now)?;
            self.finalize(booking, previous).await
        } else {
            lifecycle::transition(&mut booking, BookingStatus::PaymentFailed, now)?;
            let booking = self.bookings.update(&booking, previous).await?;
            info!("UPI payment for booking {} rejected", booking.pnr);
            self.publish(&booking, BookingEventKind::StatusChanged);
            Ok(booking)
        }
    }

    pub async fn cancel(&self, pnr: &str, now: DateTime<Utc>) -> Result<Booking, CheckoutError> {
        let mut booking = self.load(pnr).await?;
        let previous = booking.status;

        lifecycle::transition(&mut booking, BookingStatus::Cancelled, now)?;
        // Seats go back only if this write is the one that cancelled a confirmed row
        let booking = self.bookings.update(&booking, previous).await?;

        if previous == BookingStatus::Confirmed {
            if let Err(e) = self
                .flights
                .adjust_seats(booking.flight.flight_id, booking.passenger_count)
                .await
            {
                error!("Failed to release seats for cancelled booking {}: {}", booking.pnr, e);
            }
        }

        info!("Booking {} cancelled", booking.pnr);
        self.publish(&booking, BookingEventKind::StatusChanged);
        Ok(booking)
    }

    // Persist a freshly confirmed booking, take the seats and credit any referral.
    // Only the writer that moves the row out of `previous` does the side effects.
    async fn finalize(&self, booking: Booking, previous: BookingStatus) -> Result<Booking, CheckoutError> {
        let booking = match self.bookings.update(&booking, previous).await {
            Ok(saved) => saved,
            Err(RepositoryError::Conflict(reason)) => {
                return match self.bookings.get_by_pnr(&booking.pnr).await? {
                    Some(current) if current.status == BookingStatus::Confirmed => {
                        info!("Booking {} was already confirmed by a concurrent callback", current.pnr);
                        Ok(current)
                    }
                    _ => Err(RepositoryError::Conflict(reason).into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        match self.flights.get(booking.flight.flight_id).await {
            Ok(Some(flight)) => {
                if let Err(e) = inventory::check_availability(flight.seats_available, booking.passenger_count as u32) {
                    warn!("Booking {} confirmed on an oversold flight: {}", booking.pnr, e);
                }
                if let Err(e) = self
                    .flights
                    .adjust_seats(flight.id, -booking.passenger_count)
                    .await
                {
                    error!("Failed to take seats for booking {}: {}", booking.pnr, e);
                }
            }
            Ok(None) => warn!("Flight {} for booking {} no longer exists", booking.flight.flight_id, booking.pnr),
            Err(e) => error!("Failed to load flight for booking {}: {}", booking.pnr, e),
        }

        self.credit_referral(&booking).await;

        info!("Booking {} confirmed (payment {:?})", booking.pnr, booking.payment_id);
        self.publish(&booking, BookingEventKind::StatusChanged);
        Ok(booking)
    }

    async fn credit_referral(&self, booking: &Booking) {
        if self.rules.referral_reward_minor <= 0 {
            return;
        }

        let referrer = match self.profiles.get(&booking.user_id).await {
            Ok(Some(profile)) => match profile.referred_by {
                Some(referrer) => referrer,
                None => return,
            },
            Ok(None) => return,
            Err(e) => {
                error!("Failed to load profile {} for referral credit: {}", booking.user_id, e);
                return;
            }
        };

        match self.referrals.exists_for_referred(&booking.user_id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                error!("Failed to check referral for {}: {}", booking.user_id, e);
                return;
            }
        }

        let referral = Referral {
            id: Uuid::new_v4(),
            referrer_id: referrer.clone(),
            referred_user_id: booking.user_id.clone(),
            booking_id: booking.id,
            reward_minor: self.rules.referral_reward_minor,
            created_at: Utc::now(),
        };
        match self.referrals.create(&referral).await {
            Ok(_) => info!("Referral reward credited to {} for booking {}", referrer, booking.pnr),
            Err(e) => error!("Failed to credit referral for booking {}: {}", booking.pnr, e),
        }
    }

    async fn load(&self, pnr: &str) -> Result<Booking, CheckoutError> {
        let pnr = pnr.trim().to_ascii_uppercase();
        self.bookings
            .get_by_pnr(&pnr)
            .await?
            .ok_or(CheckoutError::BookingNotFound(pnr))
    }

    fn publish(&self, booking: &Booking, kind: BookingEventKind) {
        let event = BookingEvent {
            booking_id: booking.id,
            pnr: booking.pnr.clone(),
            kind,
            status: booking.status.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
