//! 控制器生命周期
//!
//! 路由把请求交给 [`dispatch`]，依次执行：CSRF 校验（非安全方法）、`before`、`index`、`after`。
//! 默认的 `before` 准备模板变量，默认的 `after` 渲染模板；控制器通常只实现 `index`。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Form, FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{MethodFilter, MethodRouter, on};
use serde::Serialize;

use crate::AppState;
use crate::cookie::Cookies;
use crate::error::AppError;
use crate::session::SessionHandle;
use crate::view::ViewVars;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FIELD: &str = "_csrf";
pub const LOCALE_COOKIE: &str = "locale";

/// 每个路由的配置
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub template: String,
    pub title: String,
}

impl RouteConfig {
    pub fn new(template: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            title: title.into(),
        }
    }
}

pub struct RequestContext {
    pub state: AppState,
    pub method: Method,
    pub headers: HeaderMap,
    /// 路径参数、查询参数和表单字段，后者覆盖前者
    pub params: HashMap<String, String>,
    pub session: SessionHandle,
    pub cookies: Cookies,
    pub vars: ViewVars,
    pub template: String,
    pub locale: String,
    pub status: StatusCode,
    redirect: Option<String>,
}

impl RequestContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn assign<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), AppError> {
        Ok(self.vars.assign(key, value)?)
    }

    /// 相对 base_url 跳转
    pub fn redirect_to(&mut self, path: &str) {
        self.redirect = Some(self.state.view.context().url(path));
    }

    pub fn t(&self, source: &str, values: &[&str]) -> String {
        self.state
            .view
            .context()
            .translator
            .translate(&self.locale, source, values)
    }

    pub fn render(&self) -> Result<Response, AppError> {
        let body = self.state.view.render(&self.template, &self.vars)?;
        Ok((self.status, Html(body)).into_response())
    }
}

#[async_trait]
pub trait Controller: Send + Sync + 'static {
    fn route(&self) -> RouteConfig;

    async fn before(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let route = self.route();
        ctx.template = route.template;

        let translator = &ctx.state.view.context().translator;
        ctx.locale = ctx
            .cookies
            .get::<String>(LOCALE_COOKIE)
            .filter(|locale| translator.has_locale(locale))
            .unwrap_or_else(|| translator.default_locale().to_string());

        let title = ctx.t(&route.title, &[]);
        let csrf_token = ctx.session.lock().await.csrf_token();
        let locale = ctx.locale.clone();
        ctx.assign("title", title)?;
        ctx.assign("locale", locale)?;
        ctx.assign("csrf_token", csrf_token)?;
        Ok(())
    }

    async fn index(&self, ctx: &mut RequestContext) -> Result<(), AppError>;

    async fn after(&self, ctx: &mut RequestContext) -> Result<Response, AppError> {
        match ctx.redirect.take() {
            Some(to) => Ok(Redirect::to(&to).into_response()),
            None => ctx.render(),
        }
    }
}

pub fn get<C: Controller>(controller: C) -> MethodRouter<AppState> {
    handle(MethodFilter::GET, controller)
}

pub fn post<C: Controller>(controller: C) -> MethodRouter<AppState> {
    handle(MethodFilter::POST, controller)
}

pub fn handle<C: Controller>(filter: MethodFilter, controller: C) -> MethodRouter<AppState> {
    let controller = Arc::new(controller);
    on(filter, move |State(state): State<AppState>, req: Request| {
        let controller = controller.clone();
        async move { dispatch(controller.as_ref(), state, req).await }
    })
}

pub async fn dispatch<C: Controller + ?Sized>(controller: &C, state: AppState, req: Request) -> Response {
    let mut ctx = match build_context(state, req).await {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };

    match run(controller, &mut ctx).await {
        Ok(response) => (ctx.cookies, response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run<C: Controller + ?Sized>(controller: &C, ctx: &mut RequestContext) -> Result<Response, AppError> {
    ctx.session.lock().await.start().await?;
    verify_csrf(ctx).await?;
    controller.before(ctx).await?;
    controller.index(ctx).await?;
    controller.after(ctx).await
}

async fn build_context(state: AppState, req: Request) -> Result<RequestContext, AppError> {
    let (mut parts, body) = req.into_parts();

    let session = SessionHandle::from_request_parts(&mut parts, &state).await?;
    let cookies = Cookies::from_headers(&parts.headers, state.config.clone());

    let mut params = HashMap::new();
    if let Ok(Path(path)) = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &state).await {
        params.extend(path);
    }
    if let Ok(Query(query)) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
        params.extend(query);
    }

    let method = parts.method.clone();
    let headers = parts.headers.clone();
    if !is_safe(&method) {
        let req = Request::from_parts(parts, body);
        if let Ok(Form(form)) = Form::<HashMap<String, String>>::from_request(req, &state).await {
            params.extend(form);
        }
    }

    Ok(RequestContext {
        state,
        method,
        headers,
        params,
        session,
        cookies,
        vars: ViewVars::new(),
        template: String::new(),
        locale: String::new(),
        status: StatusCode::OK,
        redirect: None,
    })
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

async fn verify_csrf(ctx: &RequestContext) -> Result<(), AppError> {
    if is_safe(&ctx.method) {
        return Ok(());
    }
    let candidate = ctx
        .headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| ctx.param(CSRF_FIELD))
        .unwrap_or_default();

    if ctx.session.lock().await.verify_csrf_token(candidate) {
        Ok(())
    } else {
        tracing::warn!("Rejected {} request with invalid CSRF token", ctx.method);
        Err(AppError::CsrfMismatch)
    }
}
