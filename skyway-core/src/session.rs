//! Booking countdown.
//!
//! A session starts when the customer picks a flight and gives them a fixed
//! window to enter passengers and pay. Once the window closes the session is
//! `Expired` and no further step is accepted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};

/// Expired sessions linger this long so clients polling after zero see
/// `Expired` rather than a 404.
pub const EXPIRED_GRACE_SECONDS: u64 = 300;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    PassengerDetails,
    Payment,
    Completed,
    Expired,
}

impl BookingStep {
    fn rank(&self) -> u8 {
        match self {
            BookingStep::PassengerDetails => 0,
            BookingStep::Payment => 1,
            BookingStep::Completed => 2,
            BookingStep::Expired => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSession {
    pub id: Uuid,
    pub user_id: String,
    pub flight_id: Uuid,
    pub passengers: u32,
    pub step: BookingStep,
    pub booking_pnr: Option<String>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: BookingSession,
    pub state: BookingStep,
    pub remaining_seconds: i64,
}

impl BookingSession {
    pub fn start(user_id: impl Into<String>, flight_id: Uuid, passengers: u32, window_seconds: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            flight_id,
            passengers,
            step: BookingStep::PassengerDetails,
            booking_pnr: None,
            started_at: now,
            expires_at: now + Duration::seconds(window_seconds as i64),
        }
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.step {
            BookingStep::Completed => false,
            BookingStep::Expired => true,
            _ => now >= self.expires_at,
        }
    }

    /// The step the customer should be looking at right now.
    pub fn state_at(&self, now: DateTime<Utc>) -> BookingStep {
        if self.is_expired(now) {
            BookingStep::Expired
        } else {
            self.step
        }
    }

    /// Moves the flow forward. Going backwards, or anything after expiry,
    /// is rejected.
    pub fn advance(&mut self, to: BookingStep, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.is_expired(now) {
            self.step = BookingStep::Expired;
            return Err(SessionError::Expired(self.id));
        }
        if to.rank() < self.step.rank() || to == BookingStep::Expired {
            return Err(SessionError::InvalidTransition {
                from: self.step,
                to,
            });
        }
        self.step = to;
        Ok(())
    }

    /// Records that payment went through. Unlike `advance` this is accepted
    /// after the countdown ran out, as long as a booking was created.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        if self.booking_pnr.is_none() {
            return Err(SessionError::InvalidTransition {
                from: self.step,
                to: BookingStep::Completed,
            });
        }
        self.step = BookingStep::Completed;
        Ok(())
    }

    /// How long the store should keep this session.
    pub fn storage_ttl_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.remaining_seconds(now) as u64 + EXPIRED_GRACE_SECONDS
    }

    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        SessionView {
            session: self.clone(),
            state: self.state_at(now),
            remaining_seconds: if self.step == BookingStep::Completed { 0 } else { self.remaining_seconds(now) },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Booking session {0} has expired")]
    Expired(Uuid),

    #[error("Invalid step transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: BookingStep,
        to: BookingStep,
    },

    #[error("Session store error: {0}")]
    Store(String),
}

/// Short-lived state kept outside the datastore: booking sessions and
/// rate-limit counters.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session: &BookingSession, ttl_seconds: u64) -> Result<(), SessionError>;

    async fn get(&self, id: Uuid) -> Result<Option<BookingSession>, SessionError>;

    async fn delete(&self, id: Uuid) -> Result<(), SessionError>;

    /// Increments the counter for `key`; returns false once `limit` is exceeded
    /// within the window.
    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> Result<bool, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> BookingSession {
        BookingSession::start("user-1", Uuid::new_v4(), 2, 600, now)
    }

    #[test]
    fn test_countdown_reaches_zero_and_expires() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(s.remaining_seconds(now), 600);
        assert_eq!(s.state_at(now + Duration::seconds(599)), BookingStep::PassengerDetails);
        assert_eq!(s.remaining_seconds(now + Duration::seconds(600)), 0);
        assert_eq!(s.state_at(now + Duration::seconds(600)), BookingStep::Expired);
        assert_eq!(s.remaining_seconds(now + Duration::seconds(9000)), 0);
    }

    #[test]
    fn test_advance_forward_only() {
        let now = Utc::now();
        let mut s = session(now);
        s.advance(BookingStep::Payment, now).unwrap();
        assert!(matches!(
            s.advance(BookingStep::PassengerDetails, now),
            Err(SessionError::InvalidTransition { .. })
        ));
        s.advance(BookingStep::Completed, now).unwrap();
        assert_eq!(s.step, BookingStep::Completed);
    }

    #[test]
    fn test_advance_after_expiry_fails() {
        let now = Utc::now();
        let mut s = session(now);
        let later = now + Duration::minutes(11);
        assert!(matches!(s.advance(BookingStep::Payment, later), Err(SessionError::Expired(_))));
        assert_eq!(s.step, BookingStep::Expired);
    }

    #[test]
    fn test_completed_session_never_expires() {
        let now = Utc::now();
        let mut s = session(now);
        s.advance(BookingStep::Payment, now).unwrap();
        s.advance(BookingStep::Completed, now).unwrap();
        let view = s.view(now + Duration::hours(2));
        assert_eq!(view.state, BookingStep::Completed);
        assert_eq!(view.remaining_seconds, 0);
    }

    #[test]
    fn test_complete_requires_booking_but_not_time() {
        let now = Utc::now();
        let mut s = session(now);
        assert!(s.complete().is_err());

        s.booking_pnr = Some("ABC234".to_string());
        s.advance(BookingStep::Payment, now).unwrap();
        let _ = s.advance(BookingStep::Completed, now + Duration::minutes(11));
        assert_eq!(s.step, BookingStep::Expired);
        s.complete().unwrap();
        assert_eq!(s.state_at(now + Duration::minutes(11)), BookingStep::Completed);
    }

    #[test]
    fn test_storage_ttl_includes_grace() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(s.storage_ttl_seconds(now), 600 + EXPIRED_GRACE_SECONDS);
    }
}
