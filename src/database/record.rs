use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;
use sqlx::types::Json;

/// 一行查询结果，字段保持查询顺序
///
/// `has_one` / `belongs_to` 关联的记录以关联表名为键嵌套在内，无匹配时为 null。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn related(&self, name: &str) -> Option<Record> {
        match self.0.get(name) {
            Some(Value::Object(fields)) => Some(Record(fields.clone())),
            _ => None,
        }
    }

    pub fn into_model<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0))
    }

    /// 解码 [`Query::to_record_sql`](super::Query::to_record_sql) 返回的行
    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(fields) = row.try_get::<Json<Map<String, Value>>, _>(0)?;
        Ok(Record(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Author {
        id: i64,
        name: String,
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::new(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_related_record() {
        let row = record(json!({
            "id": 1,
            "title": "Hello",
            "authors": {"id": 7, "name": "Ada"},
            "profiles": null
        }));

        let author = row.related("authors").unwrap();
        assert_eq!(author.get("name"), Some(&json!("Ada")));
        assert!(row.related("profiles").is_none());
        assert!(row.related("missing").is_none());
        assert_eq!(
            author.into_model::<Author>().unwrap(),
            Author { id: 7, name: "Ada".into() }
        );
    }

    #[test]
    fn test_field_order_preserved() {
        let row = record(json!({"z": 1, "a": 2, "m": 3}));
        let fields: Vec<&String> = row.fields().collect();
        assert_eq!(fields, ["z", "a", "m"]);
    }
}
