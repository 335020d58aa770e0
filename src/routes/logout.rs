use async_trait::async_trait;

use crate::controller::{Controller, RequestContext, RouteConfig};
use crate::error::AppError;

/// 清空会话并删除会话 cookie
pub struct Logout;

#[async_trait]
impl Controller for Logout {
    fn route(&self) -> RouteConfig {
        RouteConfig::new("home.html", "home.title")
    }

    async fn index(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        ctx.session.lock().await.remove_all()?;
        ctx.redirect_to("/");
        Ok(())
    }
}
