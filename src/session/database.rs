use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::SessionError;
use super::handler::{HandlerSettings, SessionHandler};
use crate::database::Database;

/// Postgres 会话存储
///
/// 表结构见 `migrations/`：`id TEXT PRIMARY KEY, payload TEXT, expires_at TIMESTAMPTZ`。
/// `readSlave` 打开时从只读库读取。
pub struct DatabaseSessionHandler {
    settings: HandlerSettings,
    db: Database,
    table: String,
}

impl DatabaseSessionHandler {
    pub fn new(settings: HandlerSettings, db: Database) -> Self {
        let table = format!("\"{}\"", settings.table.replace('"', "\"\""));
        Self {
            settings,
            db,
            table,
        }
    }

    fn read_pool(&self) -> &sqlx::PgPool {
        if self.settings.read_slave {
            self.db.reader()
        } else {
            self.db.writer()
        }
    }
}

#[async_trait]
impl SessionHandler for DatabaseSessionHandler {
    fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    async fn read(&self, id: &str) -> Result<Option<String>, SessionError> {
        let sql = format!(
            "SELECT payload FROM {} WHERE id = $1 AND expires_at > NOW()",
            self.table
        );
        let payload = sqlx::query_scalar::<_, String>(&sql)
            .bind(id)
            .fetch_optional(self.read_pool())
            .await?;
        Ok(payload)
    }

    async fn write(&self, id: &str, payload: &str) -> Result<(), SessionError> {
        let expires_at = self
            .settings
            .ttl()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or(SessionError::Lifetime(self.settings.lifetime))?;
        let sql = format!(
            "INSERT INTO {} (id, payload, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at",
            self.table
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(payload)
            .bind(expires_at)
            .execute(self.db.writer())
            .await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        sqlx::query(&sql).bind(id).execute(self.db.writer()).await?;
        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> Result<u64, SessionError> {
        // 写入时已按 lifetime 计算 expires_at
        let sql = format!("DELETE FROM {} WHERE expires_at <= NOW()", self.table);
        let result = sqlx::query(&sql).execute(self.db.writer()).await?;
        tracing::debug!("Session gc removed {} rows", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig, DatabaseOptions};

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_an_error() {
        let config = Config::from_vars(|name| match name {
            "APP_SECRET" => Some("database-handler-secret".into()),
            _ => None,
        })
        .unwrap();
        let mut settings = HandlerSettings::from_config(&config);
        settings.lifetime = 10_000_000_000_000_000;

        // 惰性连接池，出错前不会访问数据库
        let db = Database::connect_lazy(&DatabaseConfig {
            dsn: "postgres://localhost/avenue_test".into(),
            username: None,
            password: None,
            options: DatabaseOptions::default(),
        })
        .unwrap();
        let handler = DatabaseSessionHandler::new(settings, db);

        assert!(matches!(
            handler.write("abc", "{}").await,
            Err(SessionError::Lifetime(10_000_000_000_000_000))
        ));
    }
}
