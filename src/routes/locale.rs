use async_trait::async_trait;

use crate::controller::{Controller, LOCALE_COOKIE, RequestContext, RouteConfig};
use crate::error::AppError;

/// 切换界面语言，写入 cookie 后回到首页
pub struct ChangeLocale;

#[async_trait]
impl Controller for ChangeLocale {
    fn route(&self) -> RouteConfig {
        RouteConfig::new("home.html", "home.title")
    }

    async fn index(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let locale = ctx.param("locale").unwrap_or_default().to_string();
        if !ctx.state.translator().has_locale(&locale) {
            return Err(AppError::BadRequest(format!("unsupported locale: {}", locale)));
        }

        ctx.cookies.set(LOCALE_COOKIE, &locale)?;
        ctx.locale = locale;
        let notice = ctx.t("locale.changed", &[]);
        ctx.session.lock().await.flash("notice", notice)?;

        tracing::debug!("Locale switched to {}", ctx.locale);
        ctx.redirect_to("/");
        Ok(())
    }
}
