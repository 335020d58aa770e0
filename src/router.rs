use axum::{Router, routing::get};

use crate::AppState;
use crate::controller;
use crate::middleware::{log_errors, session_middleware};
use crate::routes::{self, ArticleIndex, ArticleShow, ChangeLocale, Home, Logout};

pub fn create_router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/", controller::get(Home))
        .route("/articles", controller::get(ArticleIndex))
        .route("/articles/{id}", controller::get(ArticleShow))
        .route("/locale", controller::post(ChangeLocale))
        .route("/logout", controller::post(Logout))
        // 会话只挂在页面路由上
        .layer(axum::middleware::from_fn_with_state(state.clone(), session_middleware));

    let router = Router::new()
        .route("/health", get(routes::ping))
        .merge(pages)
        .layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
