use super::query::Query;

/// 绑定到单张表的模型
pub trait Model {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";

    fn query() -> Query {
        Query::new(Self::TABLE, Self::PRIMARY_KEY)
    }
}
