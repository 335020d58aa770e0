//! 会话状态
//!
//! 每个请求持有一个 [`Session`]，由中间件在响应前调用 [`Session::save`] 持久化。
//! 依赖会话 ID 的操作在 `start()` 之前调用返回 [`SessionError::NotStarted`]。

pub mod cipher;
pub mod database;
pub mod handler;
pub mod memory;
pub mod redis;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::AppError;
use crate::utils::str_random;

pub use self::database::DatabaseSessionHandler;
pub use self::handler::{HandlerSettings, SessionHandler};
pub use self::memory::MemorySessionHandler;
pub use self::redis::RedisSessionHandler;
pub use cipher::SessionCipher;

const ID_LENGTH: usize = 40;
const CSRF_KEY: &str = "_csrf_token";
const FLASH_KEY: &str = "_flash";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not started")]
    NotStarted,
    #[error("session store error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session store error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("invalid session payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("session cipher error: {0}")]
    Cipher(String),
    #[error("session lifetime out of range: {0}s")]
    Lifetime(u64),
}

/// 响应时需要对会话 cookie 做的变更
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieChange {
    Keep,
    Set(String),
    Clear,
}

pub struct Session {
    handler: Arc<dyn SessionHandler>,
    cookie_id: Option<String>,
    id: Option<String>,
    previous_id: Option<String>,
    data: Map<String, Value>,
    started: bool,
    destroyed: bool,
}

impl Session {
    /// `cookie_id` 为浏览器带来的会话 ID
    pub fn new(handler: Arc<dyn SessionHandler>, cookie_id: Option<String>) -> Self {
        Self {
            handler,
            id: cookie_id.clone(),
            cookie_id,
            previous_id: None,
            data: Map::new(),
            started: false,
            destroyed: false,
        }
    }

    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.started {
            return Ok(());
        }

        self.handler.open().await?;
        self.maybe_gc().await;

        let stored = match self.id.as_deref().filter(|id| is_valid_id(id)) {
            Some(id) => self.handler.read(id).await?,
            None => None,
        };

        let restored = match stored {
            Some(payload) => match self.decode(&payload) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::warn!("Discarding unreadable session payload: {}", e);
                    None
                }
            },
            None => None,
        };

        match restored {
            Some(data) => self.data = data,
            None => {
                // 未知 ID 不沿用，防止会话固定
                self.id = Some(new_id());
                self.data.clear();
            }
        }

        self.started = true;
        self.destroyed = false;
        if self.csrf_token().is_none() {
            self.set_csrf_token()?;
        }
        Ok(())
    }

    pub fn id(&self) -> Result<&str, SessionError> {
        if !self.started {
            return Err(SessionError::NotStarted);
        }
        self.id.as_deref().ok_or(SessionError::NotStarted)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), SessionError> {
        self.ensure_started()?;
        let value = serde_json::to_value(value)?;
        self.data.insert(key.into(), value);
        self.destroyed = false;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// 清空数据并销毁会话，保存时删除存储中的记录
    pub fn remove_all(&mut self) -> Result<(), SessionError> {
        self.ensure_started()?;
        self.data.clear();
        self.destroyed = true;
        Ok(())
    }

    /// 换新 ID，保留数据并重新签发 CSRF 令牌
    pub fn regenerate_id(&mut self) -> Result<(), SessionError> {
        self.ensure_started()?;
        let old = self.id.replace(new_id());
        if self.previous_id.is_none() {
            self.previous_id = old;
        }
        self.set_csrf_token()?;
        Ok(())
    }

    pub fn set_csrf_token(&mut self) -> Result<String, SessionError> {
        let token = str_random(ID_LENGTH);
        self.set(CSRF_KEY, &token)?;
        Ok(token)
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.get(CSRF_KEY)
    }

    pub fn verify_csrf_token(&self, candidate: &str) -> bool {
        match self.csrf_token() {
            Some(token) => constant_time_eq(token.as_bytes(), candidate.as_bytes()),
            None => false,
        }
    }

    /// 写入一次性消息，`take_flash` 读取后即删除
    pub fn flash<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), SessionError> {
        self.ensure_started()?;
        let value = serde_json::to_value(value)?;
        let bag = self
            .data
            .entry(FLASH_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !bag.is_object() {
            *bag = Value::Object(Map::new());
        }
        if let Value::Object(map) = bag {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn take_flash<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = match self.data.get_mut(FLASH_KEY) {
            Some(Value::Object(map)) => map.remove(key)?,
            _ => return None,
        };
        if matches!(self.data.get(FLASH_KEY), Some(Value::Object(map)) if map.is_empty()) {
            self.data.remove(FLASH_KEY);
        }
        serde_json::from_value(value).ok()
    }

    /// 持久化到存储；未启动的会话不做任何事
    pub async fn save(&mut self) -> Result<(), SessionError> {
        if !self.started {
            return Ok(());
        }

        if let Some(previous) = self.previous_id.take() {
            self.handler.destroy(&previous).await?;
        }

        let id = self.id()?.to_string();
        if self.destroyed {
            self.handler.destroy(&id).await?;
        } else {
            let payload = self.handler.encrypt(&serde_json::to_string(&self.data)?)?;
            self.handler.write(&id, &payload).await?;
        }
        self.handler.close().await
    }

    pub fn cookie_change(&self) -> CookieChange {
        if !self.started {
            return CookieChange::Keep;
        }
        if self.destroyed {
            return match self.cookie_id {
                Some(_) => CookieChange::Clear,
                None => CookieChange::Keep,
            };
        }
        match (&self.id, &self.cookie_id) {
            (Some(id), Some(cookie)) if id == cookie => CookieChange::Keep,
            (Some(id), _) => CookieChange::Set(id.clone()),
            (None, _) => CookieChange::Keep,
        }
    }

    fn ensure_started(&self) -> Result<(), SessionError> {
        if self.started {
            Ok(())
        } else {
            Err(SessionError::NotStarted)
        }
    }

    fn decode(&self, payload: &str) -> Result<Map<String, Value>, SessionError> {
        let plain = self.handler.decrypt(payload)?;
        Ok(serde_json::from_str(&plain)?)
    }

    async fn maybe_gc(&self) {
        let settings = self.handler.settings();
        if settings.gc_divisor == 0 || settings.gc_probability == 0 {
            return;
        }
        let roll = rand::thread_rng().gen_range(0..settings.gc_divisor);
        if roll < settings.gc_probability {
            match self.handler.gc(settings.lifetime()).await {
                Ok(removed) => tracing::debug!("Session gc removed {} entries", removed),
                Err(e) => tracing::warn!("Session gc failed: {}", e),
            }
        }
    }
}

fn new_id() -> String {
    str_random(ID_LENGTH)
}

fn is_valid_id(id: &str) -> bool {
    (22..=128).contains(&id.len()) && id.chars().all(|c| c.is_ascii_alphanumeric())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 请求扩展中的会话句柄
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session middleware not installed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn handler(encrypt: bool) -> Arc<MemorySessionHandler> {
        let mut config = Config::from_vars(|name| match name {
            "APP_SECRET" => Some("session-test-secret".into()),
            _ => None,
        })
        .unwrap();
        config.session.encrypt = encrypt;
        config.session.gc_probability = 0;
        Arc::new(MemorySessionHandler::new(HandlerSettings::from_config(&config)))
    }

    async fn started(handler: Arc<MemorySessionHandler>, cookie: Option<String>) -> Session {
        let mut session = Session::new(handler, cookie);
        session.start().await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_operations_before_start() {
        let mut session = Session::new(handler(true), None);
        assert!(matches!(session.id(), Err(SessionError::NotStarted)));
        assert!(matches!(session.regenerate_id(), Err(SessionError::NotStarted)));
        assert!(matches!(session.set("k", 1), Err(SessionError::NotStarted)));
        assert_eq!(session.get::<i32>("k"), None);
        assert_eq!(session.cookie_change(), CookieChange::Keep);
        session.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut session = started(handler(true), None).await;
        let id = session.id().unwrap().to_string();
        let token = session.csrf_token().unwrap();
        session.start().await.unwrap();
        assert_eq!(session.id().unwrap(), id);
        assert_eq!(session.csrf_token().unwrap(), token);
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let mut session = started(handler(true), None).await;
        session.set("user", serde_json::json!({"name": "ada"})).unwrap();
        session.set("visits", 3).unwrap();

        assert_eq!(session.get::<i32>("visits"), Some(3));
        assert_eq!(session.get_value("user"), Some(&serde_json::json!({"name": "ada"})));
        assert_eq!(session.get::<String>("missing"), None);

        session.remove("visits");
        assert_eq!(session.get::<i32>("visits"), None);
    }

    #[tokio::test]
    async fn test_remove_all_empties_and_destroys() {
        let store = handler(false);
        let mut session = started(store.clone(), None).await;
        session.set("a", 1).unwrap();
        session.set("b", "two").unwrap();
        session.save().await.unwrap();
        let id = session.id().unwrap().to_string();
        assert!(store.read(&id).await.unwrap().is_some());

        let mut session = started(store.clone(), Some(id.clone())).await;
        session.remove_all().unwrap();
        assert_eq!(session.get::<i32>("a"), None);
        assert_eq!(session.get::<String>("b"), None);
        assert_eq!(session.csrf_token(), None);
        assert_eq!(session.cookie_change(), CookieChange::Clear);

        session.save().await.unwrap();
        assert!(store.read(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persisted_across_requests() {
        let store = handler(true);
        let mut first = started(store.clone(), None).await;
        first.set("visits", 1).unwrap();
        first.save().await.unwrap();
        let id = first.id().unwrap().to_string();
        assert_eq!(first.cookie_change(), CookieChange::Set(id.clone()));

        // 存储中是密文
        let raw = store.read(&id).await.unwrap().unwrap();
        assert!(!raw.contains("visits"));

        let second = started(store, Some(id.clone())).await;
        assert_eq!(second.id().unwrap(), id);
        assert_eq!(second.get::<i32>("visits"), Some(1));
        assert_eq!(second.csrf_token(), first.csrf_token());
        assert_eq!(second.cookie_change(), CookieChange::Keep);
    }

    #[tokio::test]
    async fn test_unknown_id_is_replaced() {
        let forged = "a".repeat(40);
        let session = started(handler(true), Some(forged.clone())).await;
        assert_ne!(session.id().unwrap(), forged);

        let session = started(handler(true), Some("bad id!".into())).await;
        assert_eq!(session.id().unwrap().len(), 40);
    }

    #[tokio::test]
    async fn test_regenerate_keeps_data_and_rotates_token() {
        let store = handler(true);
        let mut session = started(store.clone(), None).await;
        session.set("user_id", 42).unwrap();
        session.save().await.unwrap();
        let old_id = session.id().unwrap().to_string();

        let mut session = started(store.clone(), Some(old_id.clone())).await;
        let old_token = session.csrf_token().unwrap();
        session.regenerate_id().unwrap();

        let new_id = session.id().unwrap().to_string();
        assert_ne!(new_id, old_id);
        assert_ne!(session.csrf_token().unwrap(), old_token);
        assert!(!session.verify_csrf_token(&old_token));
        assert_eq!(session.get::<i32>("user_id"), Some(42));

        session.save().await.unwrap();
        assert!(store.read(&old_id).await.unwrap().is_none());
        assert!(store.read(&new_id).await.unwrap().is_some());
        assert_eq!(session.cookie_change(), CookieChange::Set(new_id));
    }

    #[tokio::test]
    async fn test_csrf_token_replaced() {
        let mut session = started(handler(true), None).await;
        let first = session.csrf_token().unwrap();
        assert!(session.verify_csrf_token(&first));

        let second = session.set_csrf_token().unwrap();
        assert_ne!(first, second);
        assert!(!session.verify_csrf_token(&first));
        assert!(session.verify_csrf_token(&second));
        assert!(!session.verify_csrf_token(""));
    }

    #[tokio::test]
    async fn test_flash_is_read_once() {
        let mut session = started(handler(true), None).await;
        session.flash("notice", "saved").unwrap();
        assert_eq!(session.take_flash::<String>("notice").as_deref(), Some("saved"));
        assert_eq!(session.take_flash::<String>("notice"), None);
        assert!(session.get_value(FLASH_KEY).is_none());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
