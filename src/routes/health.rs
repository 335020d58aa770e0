use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::AppState;
use crate::utils::error_codes;

/// Ping响应
#[derive(Serialize)]
pub struct PingResponse {
    pub code: i32,
    /// 服务状态
    pub status: String,
    pub version: String,
    /// 服务器时间
    pub timestamp: i64,
}

/// 健康检查接口
pub async fn ping(State(state): State<AppState>) -> impl IntoResponse {
    Json(PingResponse {
        code: error_codes::SUCCESS,
        status: "ok".to_string(),
        version: state.config.app_version.clone(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
