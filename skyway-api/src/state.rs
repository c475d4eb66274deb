use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

use skyway_booking::{CheckoutRules, CheckoutService};
use skyway_catalog::{AncillaryCatalog, PricingConfig, PricingEngine};
use skyway_core::identity::AuthProvider;
use skyway_core::payment::PaymentGateway;
use skyway_core::repository::{
    BookingRepository, FlightRepository, PassengerRepository, ProfileRepository, ReferralRepository,
    WithdrawalRepository,
};
use skyway_core::session::SessionStore;
use skyway_core::supplier::{FlightDataProvider, TrainDataProvider};
use skyway_shared::models::events::BookingEvent;
use skyway_store::account_repo::{RestProfileRepository, RestReferralRepository, RestWithdrawalRepository};
use skyway_store::booking_repo::{RestBookingRepository, RestPassengerRepository};
use skyway_store::flight_repo::RestFlightRepository;
use skyway_store::{Config, DataClient, MemoryBackend, TokenSigner};

use crate::middleware::ResiliencyState;

/// Table repositories, either over the hosted datastore or in memory.
#[derive(Clone)]
pub struct Repositories {
    pub flights: Arc<dyn FlightRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub passengers: Arc<dyn PassengerRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub referrals: Arc<dyn ReferralRepository>,
    pub withdrawals: Arc<dyn WithdrawalRepository>,
}

impl Repositories {
    pub fn rest(client: DataClient) -> Self {
        Self {
            flights: Arc::new(RestFlightRepository::new(client.clone())),
            bookings: Arc::new(RestBookingRepository::new(client.clone())),
            passengers: Arc::new(RestPassengerRepository::new(client.clone())),
            profiles: Arc::new(RestProfileRepository::new(client.clone())),
            referrals: Arc::new(RestReferralRepository::new(client.clone())),
            withdrawals: Arc::new(RestWithdrawalRepository::new(client)),
        }
    }

    pub fn memory(backend: Arc<MemoryBackend>) -> Self {
        Self {
            flights: backend.clone(),
            bookings: backend.clone(),
            passengers: backend.clone(),
            profiles: backend.clone(),
            referrals: backend.clone(),
            withdrawals: backend,
        }
    }
}

/// Outbound collaborators other than the datastore.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub auth_provider: Arc<dyn AuthProvider>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub flight_feed: Arc<dyn FlightDataProvider>,
    pub train_feed: Arc<dyn TrainDataProvider>,
}

/// One async mutex per key, for read-check-write sequences that must not
/// interleave for the same user. Process-local: a second API instance does
/// not see these locks.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub sessions: Arc<dyn SessionStore>,
    pub auth_provider: Arc<dyn AuthProvider>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tokens: TokenSigner,
    pub checkout: Arc<CheckoutService>,
    pub flight_feed: Arc<dyn FlightDataProvider>,
    pub train_feed: Arc<dyn TrainDataProvider>,
    pub sse_tx: broadcast::Sender<BookingEvent>,
    pub resiliency: Arc<ResiliencyState>,
    pub withdrawal_locks: Arc<KeyedLocks>,
}

impl AppState {
    pub fn new(config: Config, repos: Repositories, collaborators: Collaborators) -> Self {
        // SSE Broadcast Channel
        let (sse_tx, _) = broadcast::channel(100);

        let rules = &config.business_rules;
        let pricing = PricingEngine::new(PricingConfig {
            tax_rate: rules.tax_rate,
            convenience_fee_minor: rules.convenience_fee_minor,
            rounding_minor: rules.rounding_minor,
            estimate_base_minor: rules.estimate_base_minor,
            estimate_per_minute_minor: rules.estimate_per_minute_minor,
        });

        let checkout = CheckoutService::new(
            repos.flights.clone(),
            repos.bookings.clone(),
            repos.passengers.clone(),
            repos.profiles.clone(),
            repos.referrals.clone(),
            collaborators.gateway.clone(),
            pricing,
            AncillaryCatalog::default(),
            sse_tx.clone(),
            CheckoutRules {
                referral_reward_minor: rules.referral_reward_minor,
            },
        );

        let tokens = TokenSigner::new(
            config.auth.jwt_secret.clone(),
            config.auth.jwt_audience.clone(),
            config.auth.token_ttl_seconds,
        );

        Self {
            config: Arc::new(config),
            repos,
            sessions: collaborators.sessions,
            auth_provider: collaborators.auth_provider,
            gateway: collaborators.gateway,
            tokens,
            checkout: Arc::new(checkout),
            flight_feed: collaborators.flight_feed,
            train_feed: collaborators.train_feed,
            sse_tx,
            resiliency: Arc::new(ResiliencyState::default()),
            withdrawal_locks: Arc::new(KeyedLocks::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_waits_for_holder() {
        let locks = Arc::new(KeyedLocks::default());
        let held = locks.lock("user-1").await;

        let waiting = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("user-1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        // Other keys are independent
        let _other = locks.lock("user-2").await;

        drop(held);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let locks = KeyedLocks::default();
        drop(locks.lock("user-1").await);
        drop(locks.lock("user-2").await);
        let _guard = locks.lock("user-3").await;
        assert_eq!(locks.tracked().await, 1);
    }
}
