//! In-process stand-ins for the hosted collaborators, used when no datastore
//! or Redis URL is configured and by the test suites.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use skyway_core::booking::{Booking, BookingStatus};
use skyway_core::flight::Flight;
use skyway_core::identity::{validate_credentials, AuthProvider, AuthSession, AuthUser};
use skyway_core::passenger::Passenger;
use skyway_core::profile::Profile;
use skyway_core::referral::{Referral, Withdrawal, WithdrawalStatus};
use skyway_core::repository::{
    BookingFilter, BookingRepository, FlightRepository, PassengerRepository, ProfileRepository,
    ReferralRepository, RepoResult, RepositoryError, WithdrawalRepository,
};
use skyway_core::search::FlightSearchQuery;
use skyway_core::session::{BookingSession, SessionError, SessionStore};
use skyway_core::CoreError;

use crate::flight_data::fallback_flights;
use crate::tokens::TokenSigner;

/// Routes the development backend is seeded with, in both directions.
pub const SEED_ROUTES: [(&str, &str); 6] = [
    ("DEL", "BOM"),
    ("DEL", "BLR"),
    ("BOM", "BLR"),
    ("BOM", "GOI"),
    ("DEL", "CCU"),
    ("BLR", "HYD"),
];

// ============================================================================
// Tables
// ============================================================================

#[derive(Default)]
pub struct MemoryBackend {
    flights: RwLock<HashMap<Uuid, Flight>>,
    bookings: RwLock<HashMap<String, Booking>>,
    passengers: RwLock<Vec<Passenger>>,
    profiles: RwLock<HashMap<String, Profile>>,
    referrals: RwLock<Vec<Referral>>,
    withdrawals: RwLock<HashMap<Uuid, Withdrawal>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_flight(&self, flight: Flight) {
        self.flights.write().await.insert(flight.id, flight);
    }

    /// Fills the flights table with the fallback schedule for `days` days
    /// from `start` on every seed route. Returns the number of rows.
    pub async fn seed_schedule(&self, start: NaiveDate, days: u32) -> usize {
        let mut flights = self.flights.write().await;
        let before = flights.len();
        for day in start.iter_days().take(days as usize) {
            for (a, b) in SEED_ROUTES {
                for (origin, destination) in [(a, b), (b, a)] {
                    let query = FlightSearchQuery {
                        origin: origin.to_string(),
                        destination: destination.to_string(),
                        date: day,
                        passengers: 1,
                    };
                    for flight in fallback_flights(&query) {
                        flights.insert(flight.id, flight);
                    }
                }
            }
        }
        let added = flights.len() - before;
        info!("Seeded {} flights from {} over {} days", added, start, days);
        added
    }
}

#[async_trait]
impl FlightRepository for MemoryBackend {
    async fn search(&self, query: &FlightSearchQuery) -> RepoResult<Vec<Flight>> {
        let flights = self.flights.read().await;
        let mut found: Vec<Flight> = flights
            .values()
            .filter(|f| {
                f.origin == query.origin
                    && f.destination == query.destination
                    && f.departure_time.date_naive() == query.date
                    && f.can_accommodate(query.passengers)
            })
            .cloned()
            .collect();
        found.sort_by_key(|f| f.departure_time);
        Ok(found)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Flight>> {
        Ok(self.flights.read().await.get(&id).cloned())
    }

    async fn adjust_seats(&self, id: Uuid, delta: i32) -> RepoResult<Flight> {
        let mut flights = self.flights.write().await;
        let flight = flights
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("flight {}", id)))?;
        let seats = flight.seats_available + delta;
        if seats < 0 {
            return Err(RepositoryError::Conflict(format!(
                "flight {} has {} seats, cannot take {}",
                id, flight.seats_available, -delta
            )));
        }
        flight.seats_available = seats;
        Ok(flight.clone())
    }
}

#[async_trait]
impl BookingRepository for MemoryBackend {
    async fn create(&self, booking: &Booking) -> RepoResult<Booking> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.pnr) {
            return Err(RepositoryError::Conflict(format!("pnr {}", booking.pnr)));
        }
        bookings.insert(booking.pnr.clone(), booking.clone());
        Ok(booking.clone())
    }

    async fn get_by_pnr(&self, pnr: &str) -> RepoResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(pnr).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.is_owned_by(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list(&self, filter: &BookingFilter) -> RepoResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        filter.sort(&mut found);
        found.truncate(filter.limit);
        Ok(found)
    }

    async fn update(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<Booking> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get_mut(&booking.pnr)
            .ok_or_else(|| RepositoryError::NotFound(format!("booking {}", booking.pnr)))?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict(format!(
                "booking {} is {}, expected {}",
                booking.pnr, stored.status, expected
            )));
        }
        stored.status = booking.status;
        stored.payment_method = booking.payment_method;
        stored.payment_order_id = booking.payment_order_id.clone();
        stored.payment_id = booking.payment_id.clone();
        stored.updated_at = booking.updated_at;
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        self.bookings.write().await.retain(|_, b| b.id != id);
        Ok(())
    }
}

#[async_trait]
impl PassengerRepository for MemoryBackend {
    async fn create_many(&self, passengers: &[Passenger]) -> RepoResult<Vec<Passenger>> {
        self.passengers.write().await.extend_from_slice(passengers);
        Ok(passengers.to_vec())
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<Passenger>> {
        let mut found: Vec<Passenger> = self
            .passengers
            .read()
            .await
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.seq);
        Ok(found)
    }
}

#[async_trait]
impl ProfileRepository for MemoryBackend {
    async fn get(&self, user_id: &str) -> RepoResult<Option<Profile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn get_by_referral_code(&self, code: &str) -> RepoResult<Option<Profile>> {
        let code = code.trim();
        Ok(self
            .profiles
            .read()
            .await
            .values()
            .find(|p| p.referral_code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn upsert(&self, profile: &Profile) -> RepoResult<Profile> {
        let mut profiles = self.profiles.write().await;
        let taken = profiles
            .values()
            .any(|p| p.id != profile.id && p.referral_code == profile.referral_code);
        if taken {
            return Err(RepositoryError::Conflict(format!("referral code {}", profile.referral_code)));
        }
        profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile.clone())
    }
}

#[async_trait]
impl ReferralRepository for MemoryBackend {
    async fn create(&self, referral: &Referral) -> RepoResult<Referral> {
        let mut referrals = self.referrals.write().await;
        // One reward per referred user
        if referrals.iter().any(|r| r.referred_user_id == referral.referred_user_id) {
            return Err(RepositoryError::Conflict(format!("referral for {}", referral.referred_user_id)));
        }
        referrals.push(referral.clone());
        Ok(referral.clone())
    }

    async fn list_for_referrer(&self, user_id: &str) -> RepoResult<Vec<Referral>> {
        let mut found: Vec<Referral> = self
            .referrals
            .read()
            .await
            .iter()
            .filter(|r| r.referrer_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn exists_for_referred(&self, referred_user_id: &str) -> RepoResult<bool> {
        Ok(self
            .referrals
            .read()
            .await
            .iter()
            .any(|r| r.referred_user_id == referred_user_id))
    }
}

#[async_trait]
impl WithdrawalRepository for MemoryBackend {
    async fn create(&self, withdrawal: &Withdrawal) -> RepoResult<Withdrawal> {
        self.withdrawals.write().await.insert(withdrawal.id, withdrawal.clone());
        Ok(withdrawal.clone())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Withdrawal>> {
        Ok(self.withdrawals.read().await.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Withdrawal>> {
        let mut found: Vec<Withdrawal> = self
            .withdrawals
            .read()
            .await
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list(&self, status: Option<WithdrawalStatus>) -> RepoResult<Vec<Withdrawal>> {
        let mut found: Vec<Withdrawal> = self
            .withdrawals
            .read()
            .await
            .values()
            .filter(|w| status.map_or(true, |s| w.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update(&self, withdrawal: &Withdrawal) -> RepoResult<Withdrawal> {
        let mut withdrawals = self.withdrawals.write().await;
        if !withdrawals.contains_key(&withdrawal.id) {
            return Err(RepositoryError::NotFound(format!("withdrawal {}", withdrawal.id)));
        }
        withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(withdrawal.clone())
    }
}

// ============================================================================
// Sessions & rate limits
// ============================================================================

/// Counter map size past which expired windows are swept.
const COUNTER_SWEEP_AT: usize = 1024;

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, (BookingSession, Instant)>>,
    counters: RwLock<HashMap<String, (i64, Instant)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: &BookingSession, ttl_seconds: u64) -> Result<(), SessionError> {
        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        self.sessions
            .write()
            .await
            .insert(session.id, (session.clone(), expires));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BookingSession>, SessionError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some((_, expires)) if *expires <= Instant::now() => {
                sessions.remove(&id);
                Ok(None)
            }
            Some((session, _)) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), SessionError> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> Result<bool, SessionError> {
        let now = Instant::now();
        let mut counters = self.counters.write().await;
        if counters.len() >= COUNTER_SWEEP_AT {
            counters.retain(|_, (_, reset)| *reset > now);
        }
        let entry = counters
            .entry(key.to_string())
            .or_insert((0, now + Duration::from_secs(window_seconds.max(1) as u64)));
        if entry.1 <= now {
            *entry = (0, now + Duration::from_secs(window_seconds.max(1) as u64));
        }
        entry.0 += 1;
        Ok(entry.0 <= limit)
    }
}

// ============================================================================
// Identity
// ============================================================================

struct StoredUser {
    user: AuthUser,
    password_hash: String,
}

/// Local identity provider issuing the same HS256 tokens the hosted service
/// does, so the API's token checks are identical in both modes.
pub struct MemoryAuthProvider {
    signer: TokenSigner,
    users: RwLock<HashMap<String, StoredUser>>,
    revoked: RwLock<HashSet<String>>,
}

impl MemoryAuthProvider {
    pub fn new(signer: TokenSigner) -> Self {
        Self {
            signer,
            users: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashSet::new()),
        }
    }

    fn session_for(&self, user: &AuthUser) -> Result<AuthSession, CoreError> {
        let access_token = self
            .signer
            .issue(user, None)
            .map_err(|e| CoreError::InternalError(format!("Token encoding failed: {}", e)))?;
        Ok(AuthSession {
            access_token,
            refresh_token: Some(Uuid::new_v4().simple().to_string()),
            expires_in: self.signer.ttl_seconds() as i64,
            user: user.clone(),
        })
    }
}

fn hash_password(user_id: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthSession, CoreError> {
        validate_credentials(email, password)?;
        let key = email.trim().to_ascii_lowercase();

        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return Err(CoreError::AccountExists(key));
        }
        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: key.clone(),
            full_name: Some(full_name.trim().to_string()).filter(|n| !n.is_empty()),
        };
        users.insert(
            key,
            StoredUser {
                password_hash: hash_password(&user.id, password),
                user: user.clone(),
            },
        );
        drop(users);

        self.session_for(&user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, CoreError> {
        let key = email.trim().to_ascii_lowercase();
        let users = self.users.read().await;
        let stored = users.get(&key).ok_or(CoreError::InvalidCredentials)?;
        if stored.password_hash != hash_password(&stored.user.id, password) {
            return Err(CoreError::InvalidCredentials);
        }
        self.session_for(&stored.user)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), CoreError> {
        self.revoked.write().await.insert(access_token.to_string());
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, CoreError> {
        if self.revoked.read().await.contains(access_token) {
            return Err(CoreError::IdentityError("Session has been signed out".to_string()));
        }
        let claims = self
            .signer
            .verify(access_token)
            .map_err(|_| CoreError::IdentityError("Session is invalid or has expired".to_string()))?;
        self.users
            .read()
            .await
            .values()
            .find(|u| u.user.id == claims.sub)
            .map(|u| u.user.clone())
            .ok_or_else(|| CoreError::IdentityError("Unknown user".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_seeded_schedule_is_searchable() {
        let backend = MemoryBackend::new();
        let today = Utc::now().date_naive();
        let added = backend.seed_schedule(today, 2).await;
        assert_eq!(added, SEED_ROUTES.len() * 2 * 2 * 6);

        let query = FlightSearchQuery {
            origin: "BOM".to_string(),
            destination: "DEL".to_string(),
            date: today,
            passengers: 2,
        };
        let flights = FlightRepository::search(&backend, &query).await.unwrap();
        assert_eq!(flights.len(), 6);
        assert!(flights.windows(2).all(|w| w[0].departure_time <= w[1].departure_time));
    }

    #[tokio::test]
    async fn test_adjust_seats_never_goes_negative() {
        let backend = MemoryBackend::new();
        backend.seed_schedule(Utc::now().date_naive(), 1).await;
        let flight = backend.flights.read().await.values().next().cloned().unwrap();

        let after = backend.adjust_seats(flight.id, -1).await.unwrap();
        assert_eq!(after.seats_available, flight.seats_available - 1);
        assert!(matches!(
            backend.adjust_seats(flight.id, -1000).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let store = MemorySessionStore::new();
        assert!(store.check_rate_limit("ip", 2, 60).await.unwrap());
        assert!(store.check_rate_limit("ip", 2, 60).await.unwrap());
        assert!(!store.check_rate_limit("ip", 2, 60).await.unwrap());
        assert!(store.check_rate_limit("other", 2, 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_counters_are_swept() {
        let store = MemorySessionStore::new();
        {
            let mut counters = store.counters.write().await;
            let past = Instant::now();
            for i in 0..COUNTER_SWEEP_AT {
                counters.insert(format!("ip-{}", i), (1, past));
            }
        }
        assert!(store.check_rate_limit("fresh", 2, 60).await.unwrap());
        let counters = store.counters.read().await;
        assert_eq!(counters.len(), 1);
        assert!(counters.contains_key("fresh"));
    }

    fn stored_booking(pnr: &str, status: BookingStatus) -> Booking {
        use skyway_core::booking::FareBreakdown;
        use skyway_core::flight::FlightSnapshot;
        use skyway_core::flight::CabinClass;
        use skyway_shared::pii::Masked;

        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            pnr: pnr.to_string(),
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

    #[tokio::test]
    async fn test_update_requires_expected_status() {
        let backend = MemoryBackend::new();
        let booking = BookingRepository::create(&backend, &stored_booking("QWE234", BookingStatus::Pending))
            .await
            .unwrap();

        let mut confirmed = booking.clone();
        confirmed.status = BookingStatus::Confirmed;
        let saved = BookingRepository::update(&backend, &confirmed, BookingStatus::Pending).await.unwrap();
        assert_eq!(saved.status, BookingStatus::Confirmed);

        // A second writer still holding the Pending copy loses
        let mut failed = booking.clone();
        failed.status = BookingStatus::PaymentFailed;
        assert!(matches!(
            BookingRepository::update(&backend, &failed, BookingStatus::Pending).await,
            Err(RepositoryError::Conflict(_))
        ));
        let current = BookingRepository::get_by_pnr(&backend, "QWE234").await.unwrap().unwrap();
        assert_eq!(current.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_delete_removes_booking() {
        let backend = MemoryBackend::new();
        let booking = BookingRepository::create(&backend, &stored_booking("ZXC234", BookingStatus::Pending))
            .await
            .unwrap();
        BookingRepository::delete(&backend, booking.id).await.unwrap();
        assert!(BookingRepository::get_by_pnr(&backend, "ZXC234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_ttl() {
        let store = MemorySessionStore::new();
        let session = BookingSession::start("u1", Uuid::new_v4(), 1, 600, Utc::now());
        store.put(&session, 0).await.unwrap();
        assert!(store.get(session.id).await.unwrap().is_none());

        store.put(&session, 60).await.unwrap();
        assert_eq!(store.get(session.id).await.unwrap().unwrap().id, session.id);
        store.delete(session.id).await.unwrap();
        assert!(store.get(session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auth_provider_flow() {
        let auth = MemoryAuthProvider::new(TokenSigner::new("secret", "authenticated", 60));
        let session = auth.sign_up("Asha@Example.com", "correct-horse", "Asha Rao").await.unwrap();
        assert_eq!(session.user.email, "asha@example.com");

        assert!(matches!(
            auth.sign_up("asha@example.com", "correct-horse", "Asha").await,
            Err(CoreError::AccountExists(_))
        ));
        assert!(matches!(
            auth.sign_in("asha@example.com", "wrong-horse").await,
            Err(CoreError::InvalidCredentials)
        ));

        let again = auth.sign_in("asha@example.com", "correct-horse").await.unwrap();
        let user = auth.get_user(&again.access_token).await.unwrap();
        assert_eq!(user.id, session.user.id);

        auth.sign_out(&again.access_token).await.unwrap();
        assert!(auth.get_user(&again.access_token).await.is_err());
    }
}
