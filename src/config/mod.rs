use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Development,
    Production,
}

impl FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "production" | "prod" => Ok(AppEnv::Production),
            other => Err(ConfigError::Invalid {
                name: "APP_ENV",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEnv::Development => f.write_str("development"),
            AppEnv::Production => f.write_str("production"),
        }
    }
}

/// 单个环境的数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub options: DatabaseOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseOptions {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub application_name: Option<String>,
    /// 只读从库
    #[serde(default)]
    pub replica_dsn: Option<String>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            application_name: None,
            replica_dsn: None,
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionDriver {
    Memory,
    Database,
    Redis,
}

impl FromStr for SessionDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(SessionDriver::Memory),
            "database" | "db" => Ok(SessionDriver::Database),
            "redis" => Ok(SessionDriver::Redis),
            other => Err(ConfigError::Invalid {
                name: "SESSION_DRIVER",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub driver: SessionDriver,
    pub cookie: String,
    pub table: String,
    pub lifetime: u64,
    pub read_slave: bool,
    pub encrypt: bool,
    pub gc_probability: u32,
    pub gc_divisor: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            driver: SessionDriver::Memory,
            cookie: "avenue_session".into(),
            table: "sessions".into(),
            lifetime: 7200,
            read_slave: false,
            encrypt: true,
            gc_probability: 1,
            gc_divisor: 100,
        }
    }
}

/// 会话有效期上限（秒），超出后无法换算成时间差
pub const MAX_SESSION_LIFETIME: u64 = (i64::MAX / 1000) as u64;

impl SessionConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime)
    }
}

/// 按名称查找的 cookie 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieConfig {
    /// 有效期（秒），None 为会话 cookie
    #[serde(default)]
    pub expire: Option<i64>,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_true")]
    pub http_only: bool,
    #[serde(default = "default_same_site")]
    pub same_site: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            expire: None,
            path: default_cookie_path(),
            domain: None,
            secure: false,
            http_only: true,
            same_site: default_same_site(),
        }
    }
}

fn default_cookie_path() -> String {
    "/".into()
}

fn default_true() -> bool {
    true
}

fn default_same_site() -> String {
    "lax".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub env: AppEnv,
    pub app_secret: String,
    pub app_version: String,
    pub base_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub databases: HashMap<AppEnv, DatabaseConfig>,
    pub redis_url: Option<String>,
    pub session: SessionConfig,
    pub cookies: HashMap<String, CookieConfig>,
    pub templates_dir: PathBuf,
    pub translations_dir: PathBuf,
    pub default_locale: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// 从任意变量来源构建配置，便于测试
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match var("APP_ENV") {
            Some(v) => v.parse()?,
            None => AppEnv::Development,
        };

        let app_secret = var("APP_SECRET").ok_or(ConfigError::Missing("APP_SECRET"))?;

        let databases = match var("DATABASE_CONFIG") {
            Some(path) => read_json(Path::new(&path))?,
            None => {
                let mut map = HashMap::new();
                if let Some(dsn) = var("DATABASE_URL") {
                    map.insert(
                        env,
                        DatabaseConfig {
                            dsn,
                            username: var("DATABASE_USERNAME"),
                            password: var("DATABASE_PASSWORD"),
                            options: DatabaseOptions {
                                replica_dsn: var("DATABASE_REPLICA_URL"),
                                ..DatabaseOptions::default()
                            },
                        },
                    );
                }
                map
            }
        };

        let cookies = match var("COOKIE_CONFIG") {
            Some(path) => read_json(Path::new(&path))?,
            None => HashMap::new(),
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            driver: match var("SESSION_DRIVER") {
                Some(v) => v.parse()?,
                None => defaults.driver,
            },
            cookie: var("SESSION_COOKIE").unwrap_or(defaults.cookie),
            table: var("SESSION_TABLE").unwrap_or(defaults.table),
            lifetime: parse_lifetime(var("SESSION_LIFETIME"), defaults.lifetime)?,
            read_slave: parse_or("SESSION_READ_SLAVE", var("SESSION_READ_SLAVE"), defaults.read_slave)?,
            encrypt: parse_or("SESSION_ENCRYPT", var("SESSION_ENCRYPT"), defaults.encrypt)?,
            gc_probability: parse_or(
                "SESSION_GC_PROBABILITY",
                var("SESSION_GC_PROBABILITY"),
                defaults.gc_probability,
            )?,
            gc_divisor: parse_or("SESSION_GC_DIVISOR", var("SESSION_GC_DIVISOR"), defaults.gc_divisor)?,
        };

        Ok(Config {
            env,
            app_secret,
            app_version: var("APP_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").into()),
            base_url: var("BASE_URL").unwrap_or_else(|| "/".into()),
            server_host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: var("SERVER_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            databases,
            redis_url: var("REDIS_URL"),
            session,
            cookies,
            templates_dir: var("TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("templates")),
            translations_dir: var("TRANSLATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("translations")),
            default_locale: var("DEFAULT_LOCALE").unwrap_or_else(|| "en".into()),
        })
    }

    /// 当前环境的数据库配置
    pub fn database(&self) -> Option<&DatabaseConfig> {
        self.databases.get(&self.env)
    }

    /// 未知名称返回 None
    pub fn cookie(&self, name: &str) -> Option<&CookieConfig> {
        self.cookies.get(name)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_lifetime(value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let raw = value.clone();
    let lifetime = parse_or("SESSION_LIFETIME", value, default)?;
    if lifetime > MAX_SESSION_LIFETIME {
        return Err(ConfigError::Invalid {
            name: "SESSION_LIFETIME",
            value: raw.unwrap_or_default(),
        });
    }
    Ok(lifetime)
}

fn parse_or<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: v }),
        None => Ok(default),
    }
}
