use std::sync::Arc;

use config::Config;
use database::Database;
use i18n::Translator;
use session::SessionHandler;
use view::View;

pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod cookie;
pub mod database;
pub mod error;
pub mod i18n;
pub mod middleware;
pub mod models;
pub mod router;
pub mod routes;
pub mod session;
pub mod utils;
pub mod view;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionHandler>,
    pub view: Arc<View>,
}

impl AppState {
    pub fn translator(&self) -> &Translator {
        &self.view.context().translator
    }
}
