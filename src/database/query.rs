//! 链式查询构造器
//!
//! 字段、分组和排序表达式原样拼入 SQL，不做校验；写错的字段名由数据库报错。
//! 条件值一律走绑定参数。

use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{Postgres, Row};
use sqlx::postgres::PgArguments;
use sqlx::query::Query as SqlxQuery;

use super::model::Model;
use super::record::Record;
use super::{Database, DbError};

/// 多次调用 `with` 时的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    /// 后一次覆盖前一次
    #[default]
    Replace,
    /// 追加字段
    Accumulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Cmp {
    fn as_sql(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
            Cmp::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone)]
struct Condition {
    field: String,
    cmp: Cmp,
    value: Value,
}

#[derive(Debug, Clone)]
enum JoinOn {
    /// related.fk = base.pk
    HasOne { foreign_key: String },
    /// related.pk = base.local_key
    BelongsTo { local_key: String },
}

#[derive(Debug, Clone)]
struct Relation {
    table: &'static str,
    primary_key: &'static str,
    on: JoinOn,
}

#[derive(Debug, Clone)]
pub struct Query {
    table: &'static str,
    primary_key: &'static str,
    projection: Vec<String>,
    mode: ProjectionMode,
    conditions: Vec<Condition>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    relations: Vec<Relation>,
}

impl Query {
    pub fn new(table: &'static str, primary_key: &'static str) -> Self {
        Self {
            table,
            primary_key,
            projection: Vec::new(),
            mode: ProjectionMode::default(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            relations: Vec::new(),
        }
    }

    pub fn projection_mode(mut self, mode: ProjectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// 限定返回字段
    pub fn with<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.mode == ProjectionMode::Replace {
            self.projection.clear();
        }
        self.projection.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_op(field, Cmp::Eq, value)
    }

    pub fn where_op(mut self, field: impl Into<String>, cmp: Cmp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            cmp,
            value: value.into(),
        });
        self
    }

    /// 形如 "field" 或 "field DESC"
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 一对一：关联表的外键指向本表主键
    pub fn has_one<R: Model>(mut self, foreign_key: impl Into<String>) -> Self {
        self.relations.push(Relation {
            table: R::TABLE,
            primary_key: R::PRIMARY_KEY,
            on: JoinOn::HasOne {
                foreign_key: foreign_key.into(),
            },
        });
        self
    }

    /// 本表字段指向关联表主键
    pub fn belongs_to<R: Model>(mut self, local_key: impl Into<String>) -> Self {
        self.relations.push(Relation {
            table: R::TABLE,
            primary_key: R::PRIMARY_KEY,
            on: JoinOn::BelongsTo {
                local_key: local_key.into(),
            },
        });
        self
    }

    /// 生成 SQL 和绑定参数
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let base = quote(self.table);

        let mut columns = if self.projection.is_empty() {
            vec![format!("{base}.*")]
        } else {
            self.projection.clone()
        };
        for relation in &self.relations {
            let rel = quote(relation.table);
            columns.push(format!(
                "CASE WHEN {rel}.{pk} IS NULL THEN NULL ELSE row_to_json({rel}.*) END AS {rel}",
                pk = quote(relation.primary_key),
            ));
        }

        let mut sql = format!("SELECT {} FROM {base}", columns.join(", "));

        for relation in &self.relations {
            let rel = quote(relation.table);
            let on = match &relation.on {
                JoinOn::HasOne { foreign_key } => format!(
                    "{rel}.{} = {base}.{}",
                    quote(foreign_key),
                    quote(self.primary_key)
                ),
                JoinOn::BelongsTo { local_key } => format!(
                    "{rel}.{} = {base}.{}",
                    quote(relation.primary_key),
                    quote(local_key)
                ),
            };
            sql.push_str(&format!(" LEFT JOIN {rel} ON {on}"));
        }

        let mut binds = Vec::with_capacity(self.conditions.len());
        if !self.conditions.is_empty() {
            let clauses: Vec<String> = self
                .conditions
                .iter()
                .map(|c| {
                    binds.push(c.value.clone());
                    format!("{} {} ${}", c.field, c.cmp.as_sql(), binds.len())
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, binds)
    }

    /// 整行在数据库端转成 JSON，任意列类型都按 Postgres 的 JSON 表示返回
    pub fn to_record_sql(&self) -> (String, Vec<Value>) {
        let (sql, binds) = self.to_sql();
        (
            format!("SELECT row_to_json(r) AS row_data FROM ({sql}) AS r"),
            binds,
        )
    }

    pub async fn get_all(&self, db: &Database) -> Result<Vec<Record>, DbError> {
        let (sql, binds) = self.to_record_sql();
        tracing::debug!(sql = %sql, binds = binds.len(), "query");

        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(db.reader())
            .await?;
        rows.iter()
            .map(|row| Record::from_row(row).map_err(DbError::from))
            .collect()
    }

    pub async fn get_one(&self, db: &Database) -> Result<Option<Record>, DbError> {
        let query = self.clone().limit(1);
        Ok(query.get_all(db).await?.into_iter().next())
    }

    /// 按主键查找
    pub async fn find(&self, db: &Database, id: impl Into<Value>) -> Result<Option<Record>, DbError> {
        let field = format!("{}.{}", quote(self.table), quote(self.primary_key));
        self.clone().where_eq(field, id).get_one(db).await
    }

    pub async fn count(&self, db: &Database) -> Result<i64, DbError> {
        let mut inner = self.clone();
        inner.order_by.clear();
        let (sql, binds) = inner.to_sql();
        let sql = format!("SELECT COUNT(*) FROM ({sql}) AS counted");

        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(db.reader())
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    pub async fn get_all_as<T: DeserializeOwned>(&self, db: &Database) -> Result<Vec<T>, DbError> {
        self.get_all(db)
            .await?
            .into_iter()
            .map(|record| record.into_model().map_err(DbError::from))
            .collect()
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn bind_all<'q>(
    query: SqlxQuery<'q, Postgres, PgArguments>,
    binds: &'q [Value],
) -> SqlxQuery<'q, Postgres, PgArguments> {
    binds.iter().fold(query, |q, value| match value {
        Value::Null => q.bind(None::<String>),
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => q.bind(i),
            None => q.bind(n.as_f64()),
        },
        Value::String(s) => q.bind(s.as_str()),
        other => q.bind(sqlx::types::Json(other)),
    })
}
