use async_trait::async_trait;

use crate::controller::{Controller, RequestContext, RouteConfig};
use crate::error::AppError;
use crate::models::{Article, Author};
use crate::database::Model;

pub const PAGE_SIZE: u64 = 20;

pub struct ArticleIndex;

#[async_trait]
impl Controller for ArticleIndex {
    fn route(&self) -> RouteConfig {
        RouteConfig::new("articles/index.html", "articles.title")
    }

    async fn index(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let page = ctx
            .param("page")
            .and_then(|p| p.parse::<u64>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1);

        let db = &ctx.state.db;
        let total = Article::query().count(db).await?;
        let articles: Vec<Article> = Article::latest(PAGE_SIZE)
            .offset((page - 1) * PAGE_SIZE)
            .get_all_as(db)
            .await?;

        let pages = (total.max(0) as u64).div_ceil(PAGE_SIZE).max(1);
        ctx.assign("articles", articles)?;
        ctx.assign("page", page)?;
        ctx.assign("pages", pages)?;
        ctx.assign("total", total)?;
        Ok(())
    }
}

pub struct ArticleShow;

#[async_trait]
impl Controller for ArticleShow {
    fn route(&self) -> RouteConfig {
        RouteConfig::new("articles/show.html", "articles.title")
    }

    async fn index(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let id = ctx
            .param("id")
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| AppError::NotFound("article".into()))?;

        let db = &ctx.state.db;
        let article = Article::find_with_author(db, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("article {}", id)))?;
        let author = Author::find_with_profile(db, article.author_id).await?;

        ctx.assign("title", &article.title)?;
        ctx.assign("article", article)?;
        ctx.assign("author", author)?;
        Ok(())
    }
}
