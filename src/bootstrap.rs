//! 启动检查与应用状态组装

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::AppState;
use crate::config::{AppEnv, Config, SessionDriver};
use crate::database::{Database, DbError};
use crate::i18n::{TranslationError, Translator};
use crate::session::{
    DatabaseSessionHandler, HandlerSettings, MemorySessionHandler, RedisSessionHandler, SessionHandler,
};
use crate::view::{View, ViewContext};

pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{what} directory not found: {}", path.display())]
    MissingDir { what: &'static str, path: PathBuf },
    #[error("APP_SECRET must not be empty")]
    EmptySecret,
    #[error("APP_SECRET must be at least 16 characters when session encryption is enabled")]
    WeakSecret,
    #[error("no database configured for {0}")]
    NoDatabase(AppEnv),
    #[error("REDIS_URL is required by the redis session driver")]
    NoRedis,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Translations(#[from] TranslationError),
}

/// 启动前检查，不满足时拒绝启动
pub fn check_requirements(config: &Config) -> Result<(), BootstrapError> {
    require_dir("templates", &config.templates_dir)?;
    require_dir("translations", &config.translations_dir)?;

    if config.app_secret.trim().is_empty() {
        return Err(BootstrapError::EmptySecret);
    }
    if config.session.encrypt && config.app_secret.len() < MIN_SECRET_LEN {
        return Err(BootstrapError::WeakSecret);
    }
    if config.database().is_none() {
        return Err(BootstrapError::NoDatabase(config.env));
    }
    if config.session.driver == SessionDriver::Redis && config.redis_url.is_none() {
        return Err(BootstrapError::NoRedis);
    }
    Ok(())
}

fn require_dir(what: &'static str, path: &Path) -> Result<(), BootstrapError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(BootstrapError::MissingDir {
            what,
            path: path.to_path_buf(),
        })
    }
}

pub async fn build_state(config: Config) -> Result<AppState, BootstrapError> {
    check_requirements(&config)?;

    let db_config = config.database().ok_or(BootstrapError::NoDatabase(config.env))?;
    let db = Database::connect(db_config).await?;
    if db.has_replica() {
        tracing::info!("Reads are routed to the replica");
    }

    let sessions = session_handler(&config, &db)?;
    let view = load_view(&config)?;

    Ok(AppState {
        db,
        config: Arc::new(config),
        sessions,
        view: Arc::new(view),
    })
}

/// 按配置选择会话存储
pub fn session_handler(config: &Config, db: &Database) -> Result<Arc<dyn SessionHandler>, BootstrapError> {
    let settings = HandlerSettings::from_config(config);
    let handler: Arc<dyn SessionHandler> = match config.session.driver {
        SessionDriver::Memory => Arc::new(MemorySessionHandler::new(settings)),
        SessionDriver::Database => Arc::new(DatabaseSessionHandler::new(settings, db.clone())),
        SessionDriver::Redis => {
            let url = config.redis_url.as_deref().ok_or(BootstrapError::NoRedis)?;
            let client = redis::Client::open(url)?;
            Arc::new(RedisSessionHandler::new(settings, Arc::new(client)))
        }
    };
    tracing::info!("Session driver: {:?}", config.session.driver);
    Ok(handler)
}

pub fn load_view(config: &Config) -> Result<View, BootstrapError> {
    let translator = Translator::load(&config.translations_dir, &config.default_locale)?;
    if !translator.has_locale(&config.default_locale) {
        tracing::warn!("No translations for default locale {}", config.default_locale);
    }

    Ok(View::new(
        &config.templates_dir,
        ViewContext {
            base_url: config.base_url.clone(),
            version: config.app_version.clone(),
            translator: Arc::new(translator),
        },
    ))
}
