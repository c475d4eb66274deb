use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod profile;
pub mod referrals;
pub mod search;
pub mod sessions;
pub mod state;
pub mod webhooks;

pub use state::{AppState, Collaborators, Repositories};

use crate::middleware::{admin_auth_middleware, circuit_breaker_middleware, customer_auth_middleware};

pub fn app(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .merge(search::routes())
        .merge(auth::public_routes())
        .route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook));

    let customer = Router::new()
        .merge(auth::customer_routes())
        .merge(sessions::routes())
        .merge(payments::routes())
        .merge(bookings::routes())
        .merge(profile::routes())
        .merge(referrals::routes())
        .route_layer(from_fn_with_state(state.clone(), customer_auth_middleware));

    let admin = admin::routes().route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .merge(public)
        .merge(customer)
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), circuit_breaker_middleware))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ])
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "payment_circuit": format!("{:?}", state.resiliency.payment_cb.current().await),
    }))
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    // Absent when the router is driven without a socket (tests)
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "local".to_string());
    let key = format!("ip:{}", ip);
    let limit = state.config.server.rate_limit_per_minute;

    match state.sessions.check_rate_limit(&key, limit, 60).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded" })),
        )
            .into_response(),
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
