use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};

use super::SessionError;
use super::handler::{HandlerSettings, SessionHandler};

/// Redis 会话存储，过期交给键的 TTL
pub struct RedisSessionHandler {
    settings: HandlerSettings,
    redis: Arc<RedisClient>,
}

impl RedisSessionHandler {
    pub fn new(settings: HandlerSettings, redis: Arc<RedisClient>) -> Self {
        Self { settings, redis }
    }
}

pub(crate) fn session_key(id: &str) -> String {
    format!("session:{}", id)
}

#[async_trait]
impl SessionHandler for RedisSessionHandler {
    fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    async fn read(&self, id: &str) -> Result<Option<String>, SessionError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(session_key(id)).await?;
        Ok(payload)
    }

    async fn write(&self, id: &str, payload: &str) -> Result<(), SessionError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(session_key(id), payload, self.settings.lifetime)
            .await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(session_key(id)).await?;
        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> Result<u64, SessionError> {
        Ok(0)
    }
}
