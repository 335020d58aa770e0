//! 请求级 cookie 读写
//!
//! 字符串原样写入，其他值写成 `j:` 加 base64 编码的 JSON。

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::{Config, CookieConfig};

const JSON_PREFIX: &str = "j:";

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("cookie value cannot be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 按配置生成 cookie
pub fn build_cookie(name: &str, value: String, config: &CookieConfig) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value))
        .path(config.path.clone())
        .secure(config.secure)
        .http_only(config.http_only)
        .same_site(same_site(&config.same_site));
    if let Some(domain) = &config.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(expire) = config.expire {
        builder = builder.max_age(time::Duration::seconds(expire));
    }
    builder.build()
}

fn same_site(value: &str) -> SameSite {
    match value.to_ascii_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

/// 名称未配置时用 `default` 项，再没有则用内置默认值
pub fn cookie_config(config: &Config, name: &str) -> CookieConfig {
    config
        .cookie(name)
        .or_else(|| config.cookie("default"))
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Cookies {
    jar: CookieJar,
    config: Arc<Config>,
}

impl Cookies {
    pub fn from_headers(headers: &HeaderMap, config: Arc<Config>) -> Self {
        Self {
            jar: CookieJar::from_headers(headers),
            config,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.jar.get(key)?.value();
        if let Some(encoded) = raw.strip_prefix(JSON_PREFIX) {
            let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
            return serde_json::from_slice(&bytes).ok();
        }
        serde_json::from_value(Value::String(raw.to_string()))
            .ok()
            .or_else(|| serde_json::from_str(raw).ok())
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), CookieError> {
        let encoded = match serde_json::to_value(value)? {
            Value::String(s) if !s.starts_with(JSON_PREFIX) => s,
            other => format!(
                "{}{}",
                JSON_PREFIX,
                URL_SAFE_NO_PAD.encode(serde_json::to_vec(&other)?)
            ),
        };
        let cookie = build_cookie(key, encoded, &cookie_config(&self.config, key));
        self.jar = self.jar.clone().add(cookie);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        let config = cookie_config(&self.config, key);
        let mut removal = Cookie::build(key.to_string()).path(config.path);
        if let Some(domain) = config.domain {
            removal = removal.domain(domain);
        }
        self.jar = self.jar.clone().remove(removal);
    }

    pub fn remove_all(&mut self) {
        let names: Vec<String> = self.jar.iter().map(|c| c.name().to_string()).collect();
        for name in names {
            self.remove(&name);
        }
    }

    /// 未配置的名称返回 None
    pub fn config(&self, name: &str) -> Option<&CookieConfig> {
        self.config.cookie(name)
    }
}

impl IntoResponseParts for Cookies {
    type Error = std::convert::Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.jar.into_response_parts(res)
    }
}
