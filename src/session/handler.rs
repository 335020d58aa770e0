use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::SessionError;
use super::cipher::SessionCipher;
use crate::config::Config;

/// 会话存储的公共设置
#[derive(Clone)]
pub struct HandlerSettings {
    app_secret: String,
    cipher: SessionCipher,
    pub table: String,
    pub lifetime: u64,
    pub read_slave: bool,
    pub encrypt: bool,
    pub cookie: String,
    pub gc_probability: u32,
    pub gc_divisor: u32,
}

impl HandlerSettings {
    pub fn from_config(config: &Config) -> Self {
        let session = &config.session;
        Self {
            app_secret: config.app_secret.clone(),
            cipher: SessionCipher::new(&config.app_secret),
            table: session.table.clone(),
            lifetime: session.lifetime,
            read_slave: session.read_slave,
            encrypt: session.encrypt,
            cookie: session.cookie.clone(),
            gc_probability: session.gc_probability,
            gc_divisor: session.gc_divisor,
        }
    }

    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime)
    }

    /// 有效期换算成时间差，超出范围时为 None
    pub fn ttl(&self) -> Option<chrono::Duration> {
        i64::try_from(self.lifetime)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    /// 按名称读取配置，未知名称返回 None
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "table" => Some(json!(self.table)),
            "lifetime" => Some(json!(self.lifetime)),
            "readSlave" => Some(json!(self.read_slave)),
            "encrypt" => Some(json!(self.encrypt)),
            "cookie" => Some(json!(self.cookie)),
            "gcProbability" => Some(json!(self.gc_probability)),
            "gcDivisor" => Some(json!(self.gc_divisor)),
            _ => None,
        }
    }
}

/// 会话存储后端
///
/// 负载在写入前经过 `encrypt`，读出后经过 `decrypt`；关闭加密时两者原样返回。
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    fn settings(&self) -> &HandlerSettings;

    fn app_secret(&self) -> &str {
        self.settings().app_secret()
    }

    fn config(&self, name: &str) -> Option<Value> {
        self.settings().get(name)
    }

    async fn open(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Option<String>, SessionError>;

    async fn write(&self, id: &str, payload: &str) -> Result<(), SessionError>;

    async fn destroy(&self, id: &str) -> Result<(), SessionError>;

    /// 清理过期会话，返回清理数量
    async fn gc(&self, max_lifetime: Duration) -> Result<u64, SessionError>;

    fn encrypt(&self, payload: &str) -> Result<String, SessionError> {
        let settings = self.settings();
        if settings.encrypt {
            settings.cipher.encrypt(payload)
        } else {
            Ok(payload.to_string())
        }
    }

    fn decrypt(&self, payload: &str) -> Result<String, SessionError> {
        let settings = self.settings();
        if settings.encrypt {
            settings.cipher.decrypt(payload)
        } else {
            Ok(payload.to_string())
        }
    }
}
