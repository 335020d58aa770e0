use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::SessionError;
use super::handler::{HandlerSettings, SessionHandler};

struct Entry {
    payload: String,
    touched_at: DateTime<Utc>,
}

/// 进程内会话存储，用于开发和测试
pub struct MemorySessionHandler {
    settings: HandlerSettings,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionHandler {
    pub fn new(settings: HandlerSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn is_expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        match self.settings.ttl() {
            Some(ttl) => now - entry.touched_at > ttl,
            None => false,
        }
    }
}

#[async_trait]
impl SessionHandler for MemorySessionHandler {
    fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    async fn read(&self, id: &str) -> Result<Option<String>, SessionError> {
        let entries = self.entries.lock().await;
        let now = Utc::now();
        Ok(entries
            .get(id)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.payload.clone()))
    }

    async fn write(&self, id: &str, payload: &str) -> Result<(), SessionError> {
        self.entries.lock().await.insert(
            id.to_string(),
            Entry {
                payload: payload.to_string(),
                touched_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.entries.lock().await.remove(id);
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> Result<u64, SessionError> {
        let Ok(max_lifetime) = chrono::Duration::from_std(max_lifetime) else {
            return Ok(0);
        };
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let now = Utc::now();
        entries.retain(|_, entry| now - entry.touched_at <= max_lifetime);
        Ok((before - entries.len()) as u64)
    }
}
