//! 需要 Postgres：设置 `DATABASE_URL` 后运行，未设置时跳过。
//! 每个用例在独立 schema 中建表，结束时删除。

use std::str::FromStr;
use std::sync::Arc;

use avenue::config::Config;
use avenue::database::{Database, Model};
use avenue::models::{Article, Author};
use avenue::session::{DatabaseSessionHandler, HandlerSettings, Session, SessionHandler};
use avenue::utils::str_random;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

const SCHEMA_SQL: &str = include_str!("../migrations/20240501000000_init.sql");

const SEED_SQL: &str = r#"
INSERT INTO authors (id, name, email) VALUES
    (1, 'Ada', 'ada@example.com'),
    (2, 'Bob', 'bob@example.com');
INSERT INTO profiles (author_id, bio) VALUES (1, 'Mathematician');
INSERT INTO articles (id, author_id, title, body, created_at) VALUES
    (1, 1, 'First', 'a', '2024-01-01T00:00:00Z'),
    (2, 2, 'Second', 'b', '2024-01-02T00:00:00Z'),
    (3, 1, 'Third', 'c', '2024-01-03T00:00:00Z');
"#;

struct TestDb {
    db: Database,
    admin: PgPool,
    schema: String,
}

impl TestDb {
    async fn setup() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping");
            return None;
        };

        let schema = format!("avenue_test_{}", str_random(12).to_lowercase());
        let admin = PgPool::connect(&url).await.unwrap();
        sqlx::query(&format!("CREATE SCHEMA {}", schema))
            .execute(&admin)
            .await
            .unwrap();

        let options = PgConnectOptions::from_str(&url)
            .unwrap()
            .options([("search_path", schema.as_str())]);
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await.unwrap();
        sqlx::raw_sql(SEED_SQL).execute(&pool).await.unwrap();

        Some(Self {
            db: Database::new(pool, None),
            admin,
            schema,
        })
    }

    async fn teardown(self) {
        self.db.writer().close().await;
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.admin)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn associations_and_lookups() {
    let Some(t) = TestDb::setup().await else { return };

    let ada = Author::find_with_profile(&t.db, 1).await.unwrap().unwrap();
    assert_eq!(ada.profile.and_then(|p| p.bio).as_deref(), Some("Mathematician"));
    let bob = Author::find_with_profile(&t.db, 2).await.unwrap().unwrap();
    assert!(bob.profile.is_none());

    let latest: Vec<Article> = Article::latest(10).get_all_as(&t.db).await.unwrap();
    let ids: Vec<i64> = latest.iter().map(|a| a.id).collect();
    assert_eq!(ids, [3, 2, 1]);
    let authors: Vec<&str> = latest
        .iter()
        .map(|a| a.author.as_ref().map(|au| au.name.as_str()).unwrap_or_default())
        .collect();
    assert_eq!(authors, ["Ada", "Bob", "Ada"]);

    let second = Article::find_with_author(&t.db, 2).await.unwrap().unwrap();
    assert_eq!(second.title, "Second");
    assert!(Article::find_with_author(&t.db, 99).await.unwrap().is_none());

    let newest = Article::query()
        .order_by(["id DESC"])
        .get_one(&t.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newest.get("title"), Some(&json!("Third")));
    assert!(newest.get("created_at").is_some_and(Value::is_string));

    t.teardown().await;
}

#[tokio::test]
async fn aggregates_decode() {
    let Some(t) = TestDb::setup().await else { return };

    let rows = Article::query()
        .with([
            "author_id",
            "SUM(id) AS total",
            "AVG(id) AS mean",
            "MAX(created_at) - MIN(created_at) AS span",
            "ARRAY_AGG(id ORDER BY id) AS ids",
        ])
        .group_by(["author_id"])
        .order_by(["author_id"])
        .get_all(&t.db)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    let fields: Vec<&String> = rows[0].fields().collect();
    assert_eq!(fields, ["author_id", "total", "mean", "span", "ids"]);

    assert_eq!(rows[0].get("total").and_then(Value::as_i64), Some(4));
    assert_eq!(rows[0].get("mean").and_then(Value::as_f64), Some(2.0));
    assert!(rows[0].get("span").is_some_and(Value::is_string));
    assert_eq!(rows[0].get("ids"), Some(&json!([1, 3])));
    assert_eq!(rows[1].get("total").and_then(Value::as_i64), Some(2));

    t.teardown().await;
}

#[tokio::test]
async fn counts() {
    let Some(t) = TestDb::setup().await else { return };

    assert_eq!(Article::query().count(&t.db).await.unwrap(), 3);
    assert_eq!(
        Article::query().where_eq("author_id", 1).count(&t.db).await.unwrap(),
        2
    );
    let groups = Article::query()
        .with(["author_id"])
        .group_by(["author_id"])
        .order_by(["author_id"])
        .count(&t.db)
        .await
        .unwrap();
    assert_eq!(groups, 2);

    t.teardown().await;
}

fn session_settings() -> HandlerSettings {
    let config = Config::from_vars(|name| match name {
        "APP_SECRET" => Some("database-session-secret".into()),
        _ => None,
    })
    .unwrap();
    HandlerSettings::from_config(&config)
}

#[tokio::test]
async fn session_store_cycle() {
    let Some(t) = TestDb::setup().await else { return };
    let handler = DatabaseSessionHandler::new(session_settings(), t.db.clone());

    handler.write("abc", "one").await.unwrap();
    assert_eq!(handler.read("abc").await.unwrap().as_deref(), Some("one"));
    handler.write("abc", "two").await.unwrap();
    assert_eq!(handler.read("abc").await.unwrap().as_deref(), Some("two"));

    handler.destroy("abc").await.unwrap();
    assert_eq!(handler.read("abc").await.unwrap(), None);

    sqlx::query("INSERT INTO sessions (id, payload, expires_at) VALUES ('old', '{}', NOW() - INTERVAL '1 hour')")
        .execute(t.db.writer())
        .await
        .unwrap();
    handler.write("live", "{}").await.unwrap();
    assert_eq!(handler.read("old").await.unwrap(), None);
    assert_eq!(handler.gc(handler.settings().lifetime()).await.unwrap(), 1);
    assert_eq!(handler.read("live").await.unwrap().as_deref(), Some("{}"));

    t.teardown().await;
}

#[tokio::test]
async fn session_survives_round_trip_through_store() {
    let Some(t) = TestDb::setup().await else { return };
    let handler: Arc<dyn SessionHandler> =
        Arc::new(DatabaseSessionHandler::new(session_settings(), t.db.clone()));

    let mut first = Session::new(handler.clone(), None);
    first.start().await.unwrap();
    first.set("visits", 3).unwrap();
    let id = first.id().unwrap().to_string();
    first.save().await.unwrap();

    let stored: String = sqlx::query_scalar("SELECT payload FROM sessions WHERE id = $1")
        .bind(&id)
        .fetch_one(t.db.writer())
        .await
        .unwrap();
    assert!(!stored.contains("visits"));

    let mut second = Session::new(handler, Some(id.clone()));
    second.start().await.unwrap();
    assert_eq!(second.id().unwrap(), id);
    assert_eq!(second.get::<i64>("visits"), Some(3));

    t.teardown().await;
}
