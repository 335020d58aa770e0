// 数据库模块
// 连接池、查询构造器和行记录

pub mod model;
pub mod query;
pub mod record;

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;

use crate::config::DatabaseConfig;

pub use model::Model;
pub use query::{Cmp, ProjectionMode, Query};
pub use record::Record;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("failed to decode record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// 主库连接池，可选只读从库
#[derive(Clone, Debug)]
pub struct Database {
    primary: PgPool,
    replica: Option<PgPool>,
}

impl Database {
    pub fn new(primary: PgPool, replica: Option<PgPool>) -> Self {
        Self { primary, replica }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let primary = pool_options(config)
            .connect_with(connect_options(config, &config.dsn)?)
            .await?;

        let replica = match &config.options.replica_dsn {
            Some(dsn) => {
                tracing::info!("Connecting read replica");
                Some(
                    pool_options(config)
                        .connect_with(connect_options(config, dsn)?)
                        .await?,
                )
            }
            None => None,
        };

        Ok(Self { primary, replica })
    }

    /// 首次查询时才建立连接
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DbError> {
        let primary = pool_options(config).connect_lazy_with(connect_options(config, &config.dsn)?);
        let replica = match &config.options.replica_dsn {
            Some(dsn) => Some(pool_options(config).connect_lazy_with(connect_options(config, dsn)?)),
            None => None,
        };
        Ok(Self { primary, replica })
    }

    pub fn writer(&self) -> &PgPool {
        &self.primary
    }

    /// 有从库时读从库
    pub fn reader(&self) -> &PgPool {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    pub fn has_replica(&self) -> bool {
        self.replica.is_some()
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new().max_connections(config.options.max_connections)
}

fn connect_options(config: &DatabaseConfig, dsn: &str) -> Result<PgConnectOptions, DbError> {
    let mut options = PgConnectOptions::from_str(dsn)?;
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    let application_name = config
        .options
        .application_name
        .as_deref()
        .unwrap_or("avenue");
    Ok(options.application_name(application_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseOptions;

    fn config(replica: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            dsn: "postgres://localhost:5432/avenue".into(),
            username: Some("web".into()),
            password: Some("secret".into()),
            options: DatabaseOptions {
                replica_dsn: replica.map(String::from),
                ..DatabaseOptions::default()
            },
        }
    }

    #[test]
    fn test_connect_options_apply_credentials() {
        let cfg = config(None);
        let options = connect_options(&cfg, &cfg.dsn).unwrap();
        assert_eq!(options.get_username(), "web");
        assert_eq!(options.get_database(), Some("avenue"));
        assert_eq!(options.get_application_name(), Some("avenue"));
    }

    #[test]
    fn test_invalid_dsn() {
        let cfg = config(None);
        assert!(connect_options(&cfg, "not a url").is_err());
    }

    #[tokio::test]
    async fn test_reader_prefers_replica() {
        let db = Database::connect_lazy(&config(None)).unwrap();
        assert!(!db.has_replica());

        let db = Database::connect_lazy(&config(Some("postgres://replica:5432/avenue"))).unwrap();
        assert!(db.has_replica());
    }
}
