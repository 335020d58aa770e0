use async_trait::async_trait;

use crate::controller::{Controller, RequestContext, RouteConfig};
use crate::error::AppError;

pub const VISITS_KEY: &str = "visits";

/// 首页：统计本会话的访问次数，并展示上一次请求留下的提示
pub struct Home;

#[async_trait]
impl Controller for Home {
    fn route(&self) -> RouteConfig {
        RouteConfig::new("home.html", "home.title")
    }

    async fn index(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let (visits, notice) = {
            let mut session = ctx.session.lock().await;
            let visits = session.get::<u64>(VISITS_KEY).unwrap_or(0) + 1;
            session.set(VISITS_KEY, visits)?;
            (visits, session.take_flash::<String>("notice"))
        };

        let greeting = ctx.t("home.visits", &[visits.to_string().as_str()]);
        ctx.assign("visits", visits)?;
        ctx.assign("greeting", greeting)?;
        ctx.assign("notice", notice)?;
        Ok(())
    }
}
