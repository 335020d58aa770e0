use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::AppState;
use crate::cookie::{build_cookie, cookie_config};
use crate::error::AppError;
use crate::session::{CookieChange, Session, SessionHandle};

/// 为每个请求挂上会话句柄，响应前持久化并同步会话 cookie
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let name = state.config.session.cookie.clone();
    let cookie_id = jar.get(&name).map(|c| c.value().to_string());

    let handle = SessionHandle::new(Session::new(state.sessions.clone(), cookie_id));
    req.extensions_mut().insert(handle.clone());

    let response = next.run(req).await;

    let mut session = handle.lock().await;
    if let Err(e) = session.save().await {
        return AppError::from(e).into_response();
    }

    let config = cookie_config(&state.config, &name);
    let jar = match session.cookie_change() {
        CookieChange::Keep => return response,
        CookieChange::Set(id) => jar.add(build_cookie(&name, id, &config)),
        CookieChange::Clear => {
            let mut removal = Cookie::build(name.clone()).path(config.path.clone());
            if let Some(domain) = config.domain.clone() {
                removal = removal.domain(domain);
            }
            jar.remove(removal)
        }
    };
    (jar, response).into_response()
}
