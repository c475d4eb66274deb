pub mod app_config;
pub mod error;
pub mod rest;
pub mod flight_repo;
pub mod booking_repo;
pub mod account_repo;
pub mod auth_client;
pub mod payment_gateway;
pub mod flight_data;
pub mod train_data;
pub mod tokens;
pub mod redis_repo;
pub mod memory;

pub use app_config::Config;
pub use error::StoreError;
pub use rest::DataClient;
pub use redis_repo::RedisSessionStore;
pub use memory::{MemoryAuthProvider, MemoryBackend, MemorySessionStore};
pub use tokens::{AccessClaims, TokenSigner};
