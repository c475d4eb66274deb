use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::info;
use uuid::Uuid;

use skyway_core::session::{BookingSession, SessionError, SessionStore};

use crate::error::StoreError;

#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
}

impl RedisSessionStore {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, SessionError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::from(e).into())
    }
}

fn session_key(id: Uuid) -> String {
    format!("session:{}", id)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, session: &BookingSession, ttl_seconds: u64) -> Result<(), SessionError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(session).map_err(StoreError::from)?;
        conn.set_ex::<_, _, ()>(session_key(session.id), payload, ttl_seconds.max(1))
            .await
            .map_err(StoreError::from)?;
        info!("Session {} stored ({:?}, ttl {}s)", session.id, session.step, ttl_seconds);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BookingSession>, SessionError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(session_key(id)).await.map_err(StoreError::from)?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), SessionError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(session_key(id)).await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> Result<bool, SessionError> {
        let mut conn = self.connection().await?;
        let key = format!("ratelimit:{}", key);

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .expire(&key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;

        Ok(count <= limit)
    }
}
