use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use skyway_booking::{CheckoutError, CheckoutRules, CheckoutService, NewBooking};
use skyway_catalog::{AncillaryCatalog, AncillarySelection, PricingEngine};
use skyway_core::booking::{Booking, BookingStatus, PaymentMethod};
use skyway_core::flight::{CabinClass, Flight};
use skyway_core::passenger::{ContactForm, Gender, Passenger, PassengerForm};
use skyway_core::profile::Profile;
use skyway_core::repository::{
    BookingFilter, BookingRepository, FlightRepository, PassengerRepository, ProfileRepository, ReferralRepository,
    RepoResult, RepositoryError,
};
use skyway_core::session::{BookingSession, BookingStep, SessionError};
use skyway_shared::models::events::{BookingEvent, BookingEventKind};
use skyway_store::memory::MemoryBackend;
use skyway_store::payment_gateway::{payment_signature, OfflineGateway};

const SECRET: &str = "s3cret";

struct Harness {
    backend: Arc<MemoryBackend>,
    service: CheckoutService,
    events: broadcast::Receiver<BookingEvent>,
    flight: Flight,
}

async fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let departure = Utc::now() + Duration::days(3);
    let flight = Flight {
        id: Uuid::new_v4(),
        airline: "IndiGo".to_string(),
        flight_number: "6E-201".to_string(),
        origin: "DEL".to_string(),
        destination: "BOM".to_string(),
        departure_time: departure,
        arrival_time: departure + Duration::minutes(135),
        duration_minutes: 135,
        stops: 0,
        cabin_class: CabinClass::Economy,
        price_minor: 500_000,
        currency: "INR".to_string(),
        seats_available: 5,
    };
    backend.insert_flight(flight.clone()).await;

    let (tx, events) = broadcast::channel(64);
    let service = service_over(&backend, backend.clone(), backend.clone(), tx);

    Harness { backend, service, events, flight }
}

fn service_over(
    backend: &Arc<MemoryBackend>,
    bookings: Arc<dyn BookingRepository>,
    passengers: Arc<dyn PassengerRepository>,
    events: broadcast::Sender<BookingEvent>,
) -> CheckoutService {
    CheckoutService::new(
        backend.clone(),
        bookings,
        passengers,
        backend.clone(),
        backend.clone(),
        Arc::new(OfflineGateway::new("rzp_test", SECRET)),
        PricingEngine::default(),
        AncillaryCatalog::default(),
        events,
        CheckoutRules::default(),
    )
}

/// Hands out one old copy of a booking, as a callback that read it before
/// another writer confirmed it would see.
struct StaleRead {
    inner: Arc<MemoryBackend>,
    snapshot: Mutex<Option<Booking>>,
}

#[async_trait]
impl BookingRepository for StaleRead {
    async fn create(&self, booking: &Booking) -> RepoResult<Booking> {
        BookingRepository::create(self.inner.as_ref(), booking).await
    }

    async fn get_by_pnr(&self, pnr: &str) -> RepoResult<Option<Booking>> {
        let snapshot = self.snapshot.lock().unwrap().take();
        match snapshot {
            Some(booking) => Ok(Some(booking)),
            None => BookingRepository::get_by_pnr(self.inner.as_ref(), pnr).await,
        }
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Booking>> {
        BookingRepository::list_for_user(self.inner.as_ref(), user_id).await
    }

    async fn list(&self, filter: &BookingFilter) -> RepoResult<Vec<Booking>> {
        BookingRepository::list(self.inner.as_ref(), filter).await
    }

    async fn update(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<Booking> {
        BookingRepository::update(self.inner.as_ref(), booking, expected).await
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        BookingRepository::delete(self.inner.as_ref(), id).await
    }
}

struct RejectingPassengers;

#[async_trait]
impl PassengerRepository for RejectingPassengers {
    async fn create_many(&self, _passengers: &[Passenger]) -> RepoResult<Vec<Passenger>> {
        Err(RepositoryError::Backend("passengers table unavailable".to_string()))
    }

    async fn list_for_booking(&self, _booking_id: Uuid) -> RepoResult<Vec<Passenger>> {
        Ok(vec![])
    }
}

fn adult(name: &str) -> PassengerForm {
    PassengerForm {
        full_name: name.to_string(),
        age: 34,
        gender: Gender::Female,
        document_type: None,
        document_number: None,
        nationality: Some("IN".to_string()),
    }
}

fn request(passengers: Vec<PassengerForm>) -> NewBooking {
    NewBooking {
        passengers,
        contact: ContactForm {
            email: "Asha@Example.com".to_string(),
            phone: "+91 98765-43210".to_string(),
        },
        ancillaries: vec![],
    }
}

fn session(h: &Harness, user: &str, passengers: u32) -> BookingSession {
    BookingSession::start(user, h.flight.id, passengers, 600, Utc::now())
}

async fn seats(h: &Harness) -> i32 {
    FlightRepository::get(h.backend.as_ref(), h.flight.id)
        .await
        .unwrap()
        .unwrap()
        .seats_available
}

#[tokio::test]
async fn test_create_booking_prices_and_advances_session() {
    let mut h = harness().await;
    let mut s = session(&h, "user-1", 2);
    let mut req = request(vec![adult("Asha Rao"), adult("Ravi Rao")]);
    req.ancillaries = vec![AncillarySelection { code: "MEAL-VEG".to_string(), passenger_index: 1 }];

    let detail = h.service.create_booking(&mut s, req, Utc::now()).await.unwrap();
    let booking = &detail.booking;

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.pnr.len(), 6);
    assert_eq!(booking.passenger_count, 2);
    assert_eq!(booking.fare.base_fare_minor, 1_000_000);
    assert_eq!(booking.fare.ancillaries_minor, 35_000);
    assert_eq!(booking.total_minor, booking.fare.total_minor);
    assert_eq!(booking.contact_email.expose(), "asha@example.com");

    assert_eq!(detail.passengers.len(), 2);
    assert!(detail.passengers[0].email.is_some());
    assert!(detail.passengers[1].email.is_none());

    assert_eq!(s.step, BookingStep::Payment);
    assert_eq!(s.booking_pnr.as_deref(), Some(booking.pnr.as_str()));

    let event = h.events.try_recv().unwrap();
    assert_eq!(event.kind, BookingEventKind::Created);
    assert_eq!(event.pnr, booking.pnr);

    // Seats are only taken at confirmation
    assert_eq!(seats(&h).await, 5);
}

#[tokio::test]
async fn test_create_booking_rejects_bad_input() {
    let h = harness().await;

    let mut s = session(&h, "user-1", 2);
    let err = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(ref e) if e.has_field("passengers")));

    let mut s = session(&h, "user-1", 1);
    let mut req = request(vec![adult("A")]);
    req.contact.email = "not-an-email".to_string();
    let err = h.service.create_booking(&mut s, req, Utc::now()).await.unwrap_err();
    match err {
        CheckoutError::Validation(e) => {
            assert!(e.has_field("passengers[0].full_name"));
            assert!(e.has_field("contact.email"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(s.step, BookingStep::PassengerDetails);
}

#[tokio::test]
async fn test_create_booking_after_countdown_fails() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let later = Utc::now() + Duration::minutes(11);
    let err = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), later)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Session(SessionError::Expired(_))));
}

#[tokio::test]
async fn test_create_booking_checks_inventory() {
    let h = harness().await;
    let forms = (0..6).map(|i| adult(&format!("Passenger {}", "ABCDEF".chars().nth(i).unwrap()))).collect();
    let mut s = session(&h, "user-1", 6);
    let err = h.service.create_booking(&mut s, request(forms), Utc::now()).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Inventory(_)));
}

#[tokio::test]
async fn test_gateway_payment_confirms_and_takes_seats() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 2);
    let detail = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao"), adult("Ravi Rao")]), Utc::now())
        .await
        .unwrap();
    let pnr = detail.booking.pnr.clone();

    let order = h.service.start_payment(&pnr, Utc::now()).await.unwrap();
    assert_eq!(order.amount_minor, detail.booking.total_minor);
    assert_eq!(order.receipt, pnr);

    let signature = payment_signature(SECRET, &order.id, "pay_001");
    let booking = h
        .service
        .confirm_gateway_payment(&pnr, &order.id, "pay_001", &signature, Utc::now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_method, Some(PaymentMethod::Gateway));
    assert_eq!(seats(&h).await, 3);

    // Replayed callback is a no-op
    let again = h
        .service
        .confirm_gateway_payment(&pnr, &order.id, "pay_001", &signature, Utc::now())
        .await
        .unwrap();
    assert_eq!(again.status, BookingStatus::Confirmed);
    assert_eq!(seats(&h).await, 3);
}

#[tokio::test]
async fn test_bad_signature_fails_payment_and_allows_retry() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;

    let order = h.service.start_payment(&pnr, Utc::now()).await.unwrap();
    let err = h
        .service
        .confirm_gateway_payment(&pnr, &order.id, "pay_001", "deadbeef", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidSignature));
    assert_eq!(h.service.detail(&pnr).await.unwrap().booking.status, BookingStatus::PaymentFailed);

    let err = h
        .service
        .confirm_gateway_payment(&pnr, "order_other", "pay_001", "deadbeef", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::PaymentMismatch(_)));

    let retry = h.service.start_payment(&pnr, Utc::now()).await.unwrap();
    assert_ne!(retry.id, order.id);
    assert_eq!(h.service.detail(&pnr).await.unwrap().booking.status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_upi_submission_and_review() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;

    assert!(matches!(
        h.service.submit_upi(&pnr, "12345", Utc::now()).await,
        Err(CheckoutError::InvalidUtr(_))
    ));

    let booking = h.service.submit_upi(&pnr, " 412345678901 ", Utc::now()).await.unwrap();
    assert_eq!(booking.status, BookingStatus::AwaitingVerification);
    assert_eq!(booking.payment_id.as_deref(), Some("UPI-412345678901"));
    assert_eq!(seats(&h).await, 5);

    let booking = h.service.review_upi(&pnr.to_lowercase(), true, Utc::now()).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(seats(&h).await, 4);

    assert!(matches!(
        h.service.review_upi(&pnr, false, Utc::now()).await,
        Err(CheckoutError::Lifecycle(_))
    ));
}

#[tokio::test]
async fn test_rejected_upi_marks_payment_failed() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    h.service.submit_upi(&pnr, "412345678901", Utc::now()).await.unwrap();

    let booking = h.service.review_upi(&pnr, false, Utc::now()).await.unwrap();
    assert_eq!(booking.status, BookingStatus::PaymentFailed);
    assert_eq!(seats(&h).await, 5);
}

#[tokio::test]
async fn test_webhook_confirms_once() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    let order = h.service.start_payment(&pnr, Utc::now()).await.unwrap();

    let booking = h
        .service
        .apply_gateway_webhook(&pnr, &order.id, "pay_009", true, Utc::now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);

    h.service
        .apply_gateway_webhook(&pnr, &order.id, "pay_009", true, Utc::now())
        .await
        .unwrap();
    assert_eq!(seats(&h).await, 4);

    assert!(matches!(
        h.service.apply_gateway_webhook(&pnr, "order_x", "pay_009", true, Utc::now()).await,
        Err(CheckoutError::PaymentMismatch(_))
    ));
}

#[tokio::test]
async fn test_first_confirmed_booking_credits_referrer_once() {
    let h = harness().await;
    let referrer = Profile::new("referrer", Some("ravi@example.com".to_string()), "Ravi Rao", None);
    let referred = Profile::new("user-2", Some("asha@example.com".to_string()), "Asha Rao", Some("referrer".to_string()));
    h.backend.upsert(&referrer).await.unwrap();
    h.backend.upsert(&referred).await.unwrap();

    for _ in 0..2 {
        let mut s = session(&h, "user-2", 1);
        let pnr = h
            .service
            .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
            .await
            .unwrap()
            .booking
            .pnr;
        h.service.submit_upi(&pnr, "412345678901", Utc::now()).await.unwrap();
        h.service.review_upi(&pnr, true, Utc::now()).await.unwrap();
    }

    let rewards = h.backend.list_for_referrer("referrer").await.unwrap();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].reward_minor, CheckoutRules::default().referral_reward_minor);
    assert_eq!(rewards[0].referred_user_id, "user-2");
}

#[tokio::test]
async fn test_cancel_restores_seats_of_confirmed_booking() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 2);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao"), adult("Ravi Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    h.service.submit_upi(&pnr, "412345678901", Utc::now()).await.unwrap();
    h.service.review_upi(&pnr, true, Utc::now()).await.unwrap();
    assert_eq!(seats(&h).await, 3);

    let booking = h.service.cancel(&pnr, Utc::now()).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(seats(&h).await, 5);

    assert!(matches!(h.service.cancel(&pnr, Utc::now()).await, Err(CheckoutError::Lifecycle(_))));
    assert!(matches!(
        h.service.detail("ZZZZZZ").await,
        Err(CheckoutError::BookingNotFound(_))
    ));
}

#[tokio::test]
async fn test_passengers_keep_party_position() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 3);
    let detail = h
        .service
        .create_booking(
            &mut s,
            request(vec![adult("Asha Rao"), adult("Ravi Rao"), adult("Meera Rao")]),
            Utc::now(),
        )
        .await
        .unwrap();

    let stored = h.service.detail(&detail.booking.pnr).await.unwrap().passengers;
    let seqs: Vec<i32> = stored.iter().map(|p| p.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(stored[2].full_name, "Meera Rao");
}

#[tokio::test]
async fn test_passenger_insert_failure_leaves_no_booking() {
    let h = harness().await;
    let (tx, _rx) = broadcast::channel(8);
    let service = service_over(&h.backend, h.backend.clone(), Arc::new(RejectingPassengers), tx);

    let mut s = session(&h, "user-1", 1);
    let err = service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Repository(RepositoryError::Backend(_))));

    assert!(BookingRepository::list_for_user(h.backend.as_ref(), "user-1").await.unwrap().is_empty());
    assert!(s.booking_pnr.is_none());
    assert_eq!(s.step, BookingStep::PassengerDetails);
}

#[tokio::test]
async fn test_failed_attempt_webhook_keeps_order_payable() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    let order = h.service.start_payment(&pnr, Utc::now()).await.unwrap();

    // First card declined, second one goes through on the same order
    let booking = h
        .service
        .apply_gateway_webhook(&pnr, &order.id, "pay_declined", false, Utc::now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    let signature = payment_signature(SECRET, &order.id, "pay_ok");
    let booking = h
        .service
        .confirm_gateway_payment(&pnr, &order.id, "pay_ok", &signature, Utc::now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_id.as_deref(), Some("pay_ok"));
    assert_eq!(seats(&h).await, 4);
}

#[tokio::test]
async fn test_captured_webhook_after_bad_signature_confirms() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    let order = h.service.start_payment(&pnr, Utc::now()).await.unwrap();

    h.service
        .confirm_gateway_payment(&pnr, &order.id, "pay_010", "tampered", Utc::now())
        .await
        .unwrap_err();
    assert_eq!(h.service.detail(&pnr).await.unwrap().booking.status, BookingStatus::PaymentFailed);

    let booking = h
        .service
        .apply_gateway_webhook(&pnr, &order.id, "pay_010", true, Utc::now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(seats(&h).await, 4);
}

#[tokio::test]
async fn test_verified_callback_after_bad_signature_confirms() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    let order = h.service.start_payment(&pnr, Utc::now()).await.unwrap();

    h.service
        .confirm_gateway_payment(&pnr, &order.id, "pay_011", "tampered", Utc::now())
        .await
        .unwrap_err();
    // A second bad callback leaves the failed booking as it is
    h.service
        .confirm_gateway_payment(&pnr, &order.id, "pay_011", "tampered", Utc::now())
        .await
        .unwrap_err();

    let signature = payment_signature(SECRET, &order.id, "pay_011");
    let booking = h
        .service
        .confirm_gateway_payment(&pnr, &order.id, "pay_011", &signature, Utc::now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(seats(&h).await, 4);
}

#[tokio::test]
async fn test_late_confirmation_does_not_take_seats_twice() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 2);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao"), adult("Ravi Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    let order = h.service.start_payment(&pnr, Utc::now()).await.unwrap();
    let pending = h.service.detail(&pnr).await.unwrap().booking;
    assert_eq!(pending.status, BookingStatus::Pending);

    let signature = payment_signature(SECRET, &order.id, "pay_020");
    h.service
        .confirm_gateway_payment(&pnr, &order.id, "pay_020", &signature, Utc::now())
        .await
        .unwrap();
    assert_eq!(seats(&h).await, 3);

    // The webhook read the row while it was still pending
    let stale = Arc::new(StaleRead {
        inner: h.backend.clone(),
        snapshot: Mutex::new(Some(pending)),
    });
    let (tx, _rx) = broadcast::channel(8);
    let racing = service_over(&h.backend, stale, h.backend.clone(), tx);

    let booking = racing
        .apply_gateway_webhook(&pnr, &order.id, "pay_020", true, Utc::now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(seats(&h).await, 3);
}

#[tokio::test]
async fn test_cancel_against_moved_booking_keeps_seats() {
    let h = harness().await;
    let mut s = session(&h, "user-1", 1);
    let pnr = h
        .service
        .create_booking(&mut s, request(vec![adult("Asha Rao")]), Utc::now())
        .await
        .unwrap()
        .booking
        .pnr;
    h.service.submit_upi(&pnr, "412345678901", Utc::now()).await.unwrap();
    h.service.review_upi(&pnr, true, Utc::now()).await.unwrap();
    let confirmed = h.service.detail(&pnr).await.unwrap().booking;
    h.service.cancel(&pnr, Utc::now()).await.unwrap();
    assert_eq!(seats(&h).await, 5);

    // Second cancel still holding the confirmed copy
    let stale = Arc::new(StaleRead {
        inner: h.backend.clone(),
        snapshot: Mutex::new(Some(confirmed)),
    });
    let (tx, _rx) = broadcast::channel(8);
    let racing = service_over(&h.backend, stale, h.backend.clone(), tx);

    let err = racing.cancel(&pnr, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Repository(RepositoryError::Conflict(_))));
    assert_eq!(seats(&h).await, 5);
}
