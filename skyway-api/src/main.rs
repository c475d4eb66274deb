use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyway_api::{app, AppState, Collaborators, Repositories};
use skyway_core::identity::AuthProvider;
use skyway_core::payment::PaymentGateway;
use skyway_core::session::SessionStore;
use skyway_store::auth_client::HttpAuthProvider;
use skyway_store::flight_data::HttpFlightDataProvider;
use skyway_store::payment_gateway::{OfflineGateway, RazorpayGateway};
use skyway_store::train_data::HttpTrainDataProvider;
use skyway_store::{
    Config, DataClient, MemoryAuthProvider, MemoryBackend, MemorySessionStore, RedisSessionStore, TokenSigner,
};

/// Days of schedule generated for the in-memory backend.
const SEED_DAYS: u32 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyway_api=debug,skyway_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    info!("Starting Skyway API on port {}", config.server.port);

    // Datastore
    let repos = match config.datastore.url.as_deref() {
        Some(url) => {
            let client = DataClient::new(url, &config.datastore.api_key, config.datastore.service_key.as_deref())
                .context("Failed to build datastore client")?;
            info!("Using hosted datastore at {}", url);
            Repositories::rest(client)
        }
        None => {
            warn!("No datastore url configured, using the in-memory backend");
            let backend = Arc::new(MemoryBackend::new());
            let seeded = backend.seed_schedule(chrono::Utc::now().date_naive(), SEED_DAYS).await;
            info!("Seeded {} flights", seeded);
            Repositories::memory(backend)
        }
    };

    // Sessions & rate limits
    let sessions: Arc<dyn SessionStore> = match config.redis.url.as_deref() {
        Some(url) => Arc::new(RedisSessionStore::new(url).context("Failed to connect to Redis")?),
        None => {
            warn!("No redis url configured, keeping booking sessions in memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    // Identity
    let auth_provider: Arc<dyn AuthProvider> = match config.auth.url.as_deref() {
        Some(url) => Arc::new(
            HttpAuthProvider::new(url, &config.datastore.api_key).context("Failed to build auth client")?,
        ),
        None => {
            warn!("No auth url configured, issuing tokens locally");
            Arc::new(MemoryAuthProvider::new(TokenSigner::new(
                config.auth.jwt_secret.clone(),
                config.auth.jwt_audience.clone(),
                config.auth.token_ttl_seconds,
            )))
        }
    };

    // Payments
    let gateway: Arc<dyn PaymentGateway> = if config.payment.key_secret.is_empty() {
        warn!("No payment key secret configured, using the offline gateway");
        Arc::new(OfflineGateway::new(
            config.payment.key_id.clone(),
            offline_secret(&config),
        ))
    } else {
        Arc::new(RazorpayGateway::new(&config.payment).context("Failed to build payment gateway client")?)
    };

    // Live data feeds
    let flight_feed = Arc::new(HttpFlightDataProvider::new(&config.flight_data).context("Failed to build flight feed client")?);
    let train_feed = Arc::new(HttpTrainDataProvider::new(&config.train_data).context("Failed to build train feed client")?);

    let port = config.server.port;
    let app_state = AppState::new(
        config,
        repos,
        Collaborators {
            sessions,
            auth_provider,
            gateway,
            flight_feed,
            train_feed,
        },
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;

    Ok(())
}

/// Signing secret for locally minted payments: the webhook secret when one
/// is set, otherwise the token secret.
fn offline_secret(config: &Config) -> String {
    if config.payment.webhook_secret.is_empty() {
        config.auth.jwt_secret.clone()
    } else {
        config.payment.webhook_secret.clone()
    }
}
