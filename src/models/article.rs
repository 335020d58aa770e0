use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::{Database, DbError, Model, Query};

use super::Author;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// 关联查询时带出的作者
    #[serde(default, rename = "authors", skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

impl Model for Article {
    const TABLE: &'static str = "articles";
}

impl Article {
    /// 最新文章，附带作者
    pub fn latest(limit: u64) -> Query {
        Self::query()
            .belongs_to::<Author>("author_id")
            .order_by(["\"articles\".\"created_at\" DESC"])
            .limit(limit)
    }

    pub async fn find_with_author(db: &Database, id: i64) -> Result<Option<Self>, DbError> {
        let Some(record) = Self::query().belongs_to::<Author>("author_id").find(db, id).await? else {
            return Ok(None);
        };
        Ok(Some(record.into_model()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Record;
    use serde_json::json;

    #[test]
    fn test_latest_sql() {
        let (sql, binds) = Article::latest(20).to_sql();
        assert!(sql.starts_with("SELECT \"articles\".*"));
        assert!(sql.contains("LEFT JOIN \"authors\""));
        assert!(sql.ends_with("ORDER BY \"articles\".\"created_at\" DESC LIMIT 20"));
        assert!(binds.is_empty());
    }

    #[test]
    fn test_decode_with_author() {
        let record: Record = serde_json::from_value(json!({
            "id": 3,
            "author_id": 1,
            "title": "Hello",
            "body": "World",
            "created_at": "2024-05-01T08:00:00+00:00",
            "authors": {"id": 1, "name": "Ada", "email": "ada@example.com"}
        }))
        .unwrap();

        let article: Article = record.into_model().unwrap();
        assert_eq!(article.title, "Hello");
        assert_eq!(article.author.map(|a| a.name).as_deref(), Some("Ada"));
    }
}
